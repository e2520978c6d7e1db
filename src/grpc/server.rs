//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use super::key::PeerAddrKey;
use super::proto::tollgate::admission::v1::admission_service_server::AdmissionServiceServer;
use super::service::AdmissionServiceImpl;
use crate::error::{Result, TollgateError};
use crate::ratelimit::RateLimitBackend;

/// gRPC server for the admission service.
pub struct GrpcServer<R: RateLimitBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Keys callers by peer address
    extractor: PeerAddrKey,
}

impl<R: RateLimitBackend + 'static> GrpcServer<R> {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<R>) -> Self {
        Self {
            addr,
            rate_limiter,
            extractor: PeerAddrKey::default(),
        }
    }

    /// Use `anonymous_key` for callers without a key or peer address.
    pub fn with_anonymous_key(mut self, anonymous_key: impl Into<String>) -> Self {
        self.extractor = PeerAddrKey::new(anonymous_key);
        self
    }

    fn service(self) -> AdmissionServiceServer<AdmissionServiceImpl<R>> {
        AdmissionServiceServer::new(AdmissionServiceImpl::with_extractor(
            self.rate_limiter,
            self.extractor,
        ))
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending::<()>()).await
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let addr = self.addr;
        info!(addr = %addr, "Starting gRPC server for AdmissionService");

        Server::builder()
            .add_service(self.service())
            .serve_with_shutdown(addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                TollgateError::Grpc(e)
            })
    }

    /// Serve on an already bound listener, ignoring the configured address.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(addr = ?listener.local_addr().ok(), "Starting gRPC server for AdmissionService");

        Server::builder()
            .add_service(self.service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                TollgateError::Grpc(e)
            })
    }
}
