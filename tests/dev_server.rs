// tests/dev_server.rs

mod common;
use crate::common::{TestResult, init_tracing, with_timeout};

use std::fs;
use std::time::Duration;

use futures_util::StreamExt;
use tempfile::tempdir;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use pipedag::errors::PipedagError;
use pipedag::server::{CLIENT_PATH, DevServer, DevServerHandle, LIVERELOAD_PATH};

type Session = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a live-reload session and wait until the server has registered it.
async fn connect(server: &DevServerHandle, expected_clients: usize) -> Result<Session, Box<dyn std::error::Error>> {
    let (session, _) = connect_async(format!("ws://{}{LIVERELOAD_PATH}", server.local_addr())).await?;
    wait_for_clients(server, expected_clients).await;
    Ok(session)
}

async fn wait_for_clients(server: &DevServerHandle, expected: usize) {
    with_timeout(async {
        while server.client_count() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

/// Next text frame sent by the server.
async fn next_text(session: &mut Session) -> Result<String, Box<dyn std::error::Error>> {
    let msg = with_timeout(session.next()).await.ok_or("session closed")??;
    Ok(msg.to_text()?.to_string())
}


#[tokio::test]
async fn busy_port_is_reported() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = taken.local_addr()?.port();

    match DevServer::start(dir.path(), "127.0.0.1", port).await {
        Err(PipedagError::PortInUse(p)) => assert_eq!(p, port),
        other => panic!("expected PortInUse, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn html_pages_get_the_client_script() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(
        dir.path().join("index.html"),
        "<!doctype html><html><body><h1>Hello</h1></body></html>",
    )?;
    let server = DevServer::start(dir.path(), "127.0.0.1", 0).await?;

    for path in ["", "index.html"] {
        let body = reqwest::get(format!("{}{path}", server.url())).await?.text().await?;
        assert!(body.contains("<h1>Hello</h1>"), "body: {body}");
        assert!(
            body.contains(&format!(r#"<script src="{CLIENT_PATH}"></script></body>"#)),
            "body: {body}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn other_files_are_served_untouched() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("build/css"))?;
    fs::write(dir.path().join("build/css/style.css"), "body{color:red}")?;
    let server = DevServer::start(dir.path(), "127.0.0.1", 0).await?;

    let resp = reqwest::get(format!("{}build/css/style.css", server.url())).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await?, "body{color:red}");

    let missing = reqwest::get(format!("{}nope.html", server.url())).await?;
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn client_script_is_served() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let server = DevServer::start(dir.path(), "127.0.0.1", 0).await?;

    let resp = reqwest::get(format!("http://{}{CLIENT_PATH}", server.local_addr())).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/javascript"));
    assert!(resp.text().await?.contains(LIVERELOAD_PATH));
    Ok(())
}

#[tokio::test]
async fn live_reload_sessions_get_inject_and_reload_signals() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let server = DevServer::start(dir.path(), "127.0.0.1", 0).await?;
    let root = server.root().to_path_buf();

    let mut session = connect(&server, 1).await?;

    let sent = server.notify_reload(&[
        root.join("build/css/style.min.css"),
        root.join("build/css/style.min.css.map"),
    ]);
    assert_eq!(sent, 1);
    assert_eq!(
        next_text(&mut session).await?,
        r#"{"type":"inject","paths":["/build/css/style.min.css"]}"#
    );

    server.notify_reload(&[root.join("build/js/app.min.js")]);
    assert_eq!(next_text(&mut session).await?, r#"{"type":"reload"}"#);
    Ok(())
}

#[tokio::test]
async fn reconnected_sessions_keep_receiving_signals() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let server = DevServer::start(dir.path(), "127.0.0.1", 0).await?;
    let root = server.root().to_path_buf();

    let session = connect(&server, 1).await?;
    drop(session);
    wait_for_clients(&server, 0).await;
    assert_eq!(server.notify_reload(&[root.join("index.html")]), 0);

    let mut session = connect(&server, 1).await?;
    assert_eq!(server.notify_reload(&[root.join("index.html")]), 1);
    assert_eq!(next_text(&mut session).await?, r#"{"type":"reload"}"#);
    Ok(())
}
