//! HTTP transport and graceful shutdown.
//!
//! [`Server::serve`] accepts connections until SIGTERM or Ctrl-C, then stops
//! accepting and waits for every in-flight connection to finish.
//! [`Server::serve_on`] does the same on an already-bound listener with a
//! caller-supplied shutdown future, which is what tests use.
//!
//! Each request body is collected into [`Bytes`] before the synchronous
//! [`Service::handle`] runs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::ServeError;
use crate::service::Service;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use action_svc::Server;
    /// assert!(Server::bind("0.0.0.0:3000").is_ok());
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, ServeError> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Ok(Self { addr })
    }

    /// Binds, then serves `service` until SIGTERM or Ctrl-C.
    pub async fn serve(self, service: Arc<Service>) -> Result<(), ServeError> {
        let listener = TcpListener::bind(self.addr).await?;
        Self::serve_on(listener, service, shutdown_signal()).await
    }

    /// Serves `service` on `listener` until `shutdown` resolves, then drains
    /// in-flight connections.
    pub async fn serve_on<F>(
        listener: TcpListener,
        service: Arc<Service>,
        shutdown: F,
    ) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %listener.local_addr()?, "listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let service = Arc::clone(&service);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let service = Arc::clone(&service);
                            async move { dispatch(service, req, peer).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %peer, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Collects the body and hands the request to the service. Never fails:
/// an unreadable body becomes `400 Bad Request`.
async fn dispatch(
    service: Arc<Service>,
    req: hyper::Request<hyper::body::Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %peer, "failed to read request body: {e}");
            let mut resp = http::Response::new(Full::new(Bytes::new()));
            *resp.status_mut() = http::StatusCode::BAD_REQUEST;
            return Ok(resp);
        }
    };

    let response = service.handle(http::Request::from_parts(parts, body));
    Ok(response.map(Full::new))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT. If a handler cannot be
/// installed that arm never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
