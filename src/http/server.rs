//! HTTP server.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::routes::create_router;
use crate::error::{Result, TripError};
use crate::gate::RequestGate;

/// HTTP server for the trip planning API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    gate: RequestGate,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, gate: RequestGate) -> Self {
        Self { addr, gate }
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        info!(addr = %local, "Starting HTTP server");

        let app = create_router(self.gate).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TripError::Io(e)
            })
    }
}
