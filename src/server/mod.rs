// src/server/mod.rs

//! Development web server with live reload.

use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::middleware::map_response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

use crate::errors::{PipedagError, Result};
use crate::types::ReloadSignal;
use crate::watch::path_utils::relative_str;

pub mod livereload;

pub use livereload::{CLIENT_PATH, LIVERELOAD_PATH, inject_script};

/// Starts the dev server.
#[derive(Debug, Clone, Copy)]
pub struct DevServer;

impl DevServer {
    /// Serve `root` on `host:port`. Port `0` picks a free port.
    ///
    /// Fails with [`PipedagError::PortInUse`] if the port is already bound.
    pub async fn start(root: impl Into<PathBuf>, host: &str, port: u16) -> Result<DevServerHandle> {
        let root = root.into();

        let listener = match TcpListener::bind((host, port)).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == ErrorKind::AddrInUse => return Err(PipedagError::PortInUse(port)),
            Err(e) => return Err(e.into()),
        };
        let local_addr = listener.local_addr()?;

        let (reload_tx, _) = broadcast::channel::<ReloadSignal>(16);
        let app = router(&root, reload_tx.clone());

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!(error = %err, "dev server stopped");
            }
        });

        info!(url = %format!("http://{local_addr}/"), root = ?root, "dev server listening");

        Ok(DevServerHandle {
            inner: Arc::new(Inner {
                root,
                local_addr,
                reload_tx,
                task,
            }),
        })
    }
}

fn router(root: &Path, reload_tx: broadcast::Sender<ReloadSignal>) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload::livereload))
        .route(CLIENT_PATH, get(livereload::client_js))
        .fallback_service(ServeDir::new(root))
        .layer(map_response(livereload::inject_client))
        .with_state(reload_tx)
}

struct Inner {
    root: PathBuf,
    local_addr: SocketAddr,
    reload_tx: broadcast::Sender<ReloadSignal>,
    task: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handle to a running dev server; cheap to clone. The server stops when
/// the last handle is dropped.
#[derive(Clone)]
pub struct DevServerHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for DevServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevServerHandle")
            .field("root", &self.inner.root)
            .field("local_addr", &self.inner.local_addr)
            .finish_non_exhaustive()
    }
}

impl DevServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.inner.local_addr)
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Connected live-reload sessions.
    pub fn client_count(&self) -> usize {
        self.inner.reload_tx.receiver_count()
    }

    /// Tell connected browsers that `changed_paths` changed.
    ///
    /// Stylesheet-only changes are injected, anything else reloads the page.
    /// Returns the number of sessions signalled; zero sessions is a no-op.
    pub fn notify_reload<P: AsRef<Path>>(&self, changed_paths: &[P]) -> usize {
        let urls: Vec<String> = changed_paths
            .iter()
            .map(|p| self.url_path(p.as_ref()))
            .collect();
        self.send(ReloadSignal::for_changes(&urls))
    }

    /// Broadcast a signal to every connected session.
    pub fn send(&self, signal: ReloadSignal) -> usize {
        if self.client_count() == 0 {
            debug!(%signal, "no live-reload clients; skipping");
            return 0;
        }

        match self.inner.reload_tx.send(signal) {
            Ok(n) => {
                info!(clients = n, "sent live-reload signal");
                n
            }
            Err(_) => 0,
        }
    }

    /// URL path (`/build/css/style.css`) of a file below the served root.
    fn url_path(&self, path: &Path) -> String {
        let rel = if path.is_absolute() {
            relative_str(&self.inner.root, path)
        } else {
            Some(path.to_string_lossy().replace('\\', "/"))
        };

        match rel {
            Some(rel) => format!("/{}", rel.trim_start_matches("./")),
            None => format!(
                "/{}",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_clients_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let server = DevServer::start(tmp.path(), "127.0.0.1", 0).await.unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.notify_reload(&[tmp.path().join("index.html")]), 0);
    }

    #[tokio::test]
    async fn url_paths_are_relative_to_served_root() {
        let tmp = tempfile::tempdir().unwrap();
        let server = DevServer::start(tmp.path(), "127.0.0.1", 0).await.unwrap();

        assert_eq!(
            server.url_path(&tmp.path().join("build/css/style.css")),
            "/build/css/style.css"
        );
        assert_eq!(server.url_path(Path::new("./index.html")), "/index.html");
    }
}
