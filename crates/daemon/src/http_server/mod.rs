//! HTTP/IPC surface of the daemon: `/stat`, `/ls`, `/cat`.
//!
//! One transport per run - a Unix domain socket (preferred, consumed by the
//! interception shim) or a TCP loopback address. Handlers are thin: they
//! default the `path` query to the local root, call the facade, and project
//! results through the POSIX synthesis layer.

pub mod posix;

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use remotefs::{FsError, RemoteFs};

use self::posix::{entry_from_meta, Identity, PosixEntry};

/// How long in-flight handlers may drain after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Listening transport; exactly one is used per run.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Unix domain socket path. Recreated at bind time.
    Unix(PathBuf),
    /// TCP loopback address.
    Tcp(std::net::SocketAddr),
}

/// Shared state behind the IPC endpoints.
pub struct IpcServer {
    fs: Arc<RemoteFs>,
    identity: Identity,
}

impl IpcServer {
    pub fn new(fs: Arc<RemoteFs>) -> Self {
        Self {
            fs,
            identity: Identity::current(),
        }
    }

    fn entry(&self, meta: &remotefs_object_store::FileMeta) -> PosixEntry {
        entry_from_meta(meta, &self.identity)
    }
}

pub fn router(server: Arc<IpcServer>) -> Router {
    Router::new()
        .route("/stat", get(handle_stat))
        .route("/ls", get(handle_ls))
        .route("/cat", get(handle_cat))
        .with_state(server)
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: Option<String>,
}

impl PathQuery {
    fn path(self) -> Option<String> {
        self.path.filter(|p| !p.is_empty())
    }
}

/// Facade errors mapped onto the wire contract: 404 for missing paths with
/// the `<path>: No such file or directory` rendering, 500 otherwise, always
/// a `{"error": ...}` JSON body.
struct IpcError(FsError);

impl From<FsError> for IpcError {
    fn from(e: FsError) -> Self {
        Self(e)
    }
}

impl IntoResponse for IpcError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            error!(error = %self.0, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn handle_stat(
    State(server): State<Arc<IpcServer>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<PosixEntry>, IpcError> {
    let path = query
        .path()
        .unwrap_or_else(|| server.fs.local_root().to_string());
    let meta = server.fs.stat(&path).await?;
    Ok(Json(server.entry(&meta)))
}

async fn handle_ls(
    State(server): State<Arc<IpcServer>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Vec<PosixEntry>>, IpcError> {
    let path = query
        .path()
        .unwrap_or_else(|| server.fs.local_root().to_string());
    let items = server.fs.read_dir(&path).await?;
    Ok(Json(items.iter().map(|m| server.entry(m)).collect()))
}

async fn handle_cat(
    State(server): State<Arc<IpcServer>>,
    Query(query): Query<PathQuery>,
) -> Result<Response, IpcError> {
    let Some(path) = query.path() else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "path query parameter is required" })),
        )
            .into_response());
    };
    let handle = server.fs.read_file(&path).await?;
    // Stream as we read; the body is never buffered whole.
    let body = axum::body::Body::from_stream(ReaderStream::new(handle));
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        body,
    )
        .into_response())
}

/// Bind the requested transport and serve until `cancel` fires, then drain
/// in-flight handlers for at most [`SHUTDOWN_GRACE`].
pub async fn serve(
    server: Arc<IpcServer>,
    transport: Transport,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = router(server);
    match transport {
        Transport::Unix(path) => {
            if let Some(parent) = path.parent() {
                use std::os::unix::fs::DirBuilderExt;
                let mut builder = std::fs::DirBuilder::new();
                builder.recursive(true).mode(0o755);
                builder.create(parent)?;
            }
            // A stale socket file from a previous run blocks bind.
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            let listener = tokio::net::UnixListener::bind(&path)?;
            info!(socket = %path.display(), "serving IPC on unix socket");
            run(listener, app, cancel).await
        }
        Transport::Tcp(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(addr = %listener.local_addr()?, "serving IPC on tcp");
            run(listener, app, cancel).await
        }
    }
}

async fn run<L>(listener: L, app: Router, cancel: CancellationToken) -> std::io::Result<()>
where
    L: axum::serve::Listener,
    L::Addr: std::fmt::Debug,
{
    let shutdown = cancel.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        res = &mut server => res,
        _ = cancel.cancelled() => {
            match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
                Ok(res) => res,
                Err(_) => {
                    info!("shutdown grace elapsed, dropping in-flight connections");
                    Ok(())
                }
            }
        }
    }
}
