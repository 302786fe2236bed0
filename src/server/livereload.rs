// src/server/livereload.rs

//! Browser side of live reload: the client script, the WebSocket session
//! and the middleware that injects the script into HTML pages.

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::types::ReloadSignal;

pub const LIVERELOAD_PATH: &str = "/__pipedag/livereload";
pub const CLIENT_PATH: &str = "/__pipedag/client.js";

/// Pages larger than this are served without the client script.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

/// Connects to the live-reload socket, reconnecting every second.
/// `inject` messages swap matching stylesheets in place; anything else
/// (or a stylesheet that is not on the page) reloads the page.
pub const CLIENT_JS: &str = r#"(function () {
  var url = (location.protocol === "https:" ? "wss://" : "ws://") + location.host + "/__pipedag/livereload";

  function inject(paths) {
    var swapped = 0;
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
      var href = new URL(link.href);
      if (paths.indexOf(href.pathname) !== -1) {
        href.searchParams.set("pipedag", Date.now().toString());
        link.href = href.toString();
        swapped++;
      }
    });
    if (swapped === 0) {
      location.reload();
    }
  }

  function connect() {
    var socket = new WebSocket(url);
    socket.onmessage = function (event) {
      var signal = JSON.parse(event.data);
      if (signal.type === "inject") {
        inject(signal.paths || []);
      } else {
        location.reload();
      }
    };
    socket.onclose = function () {
      setTimeout(connect, 1000);
    };
  }

  connect();
})();
"#;

/// The `<script>` tag pointing at [`CLIENT_PATH`].
pub fn script_tag() -> String {
    format!(r#"<script src="{CLIENT_PATH}"></script>"#)
}

/// Insert the client script before the last `</body>`, or append it when the
/// page has none.
pub fn inject_script(html: &str) -> String {
    let tag = script_tag();
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..idx]);
            out.push_str(&tag);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{html}{tag}"),
    }
}

pub(crate) async fn client_js() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, HeaderValue::from_static("application/javascript; charset=utf-8"))],
        CLIENT_JS,
    )
}

pub(crate) async fn livereload(
    ws: WebSocketUpgrade,
    State(reload_tx): State<broadcast::Sender<ReloadSignal>>,
) -> Response {
    // Subscribe before the upgrade so a signal sent right after the
    // handshake is not lost.
    let rx = reload_tx.subscribe();
    ws.on_upgrade(move |socket| session(socket, rx))
}

async fn session(mut socket: WebSocket, mut rx: broadcast::Receiver<ReloadSignal>) {
    debug!("live-reload session connected");

    loop {
        tokio::select! {
            signal = rx.recv() => match signal {
                Ok(signal) => {
                    if socket.send(Message::Text(signal.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "live-reload session lagged");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("live-reload session closed");
}

/// Response middleware: add the client script to successful HTML responses.
pub(crate) async fn inject_client(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));

    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "could not buffer HTML response for script injection");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}
