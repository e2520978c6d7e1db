//! Admission service implementation.

use std::sync::Arc;
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument};

use super::key::{KeyExtractor, PeerAddrKey};
use super::proto::tollgate::admission::v1::{
    admission_service_server::AdmissionService, CheckRequest, CheckResponse,
};

use crate::ratelimit::RateLimitBackend;

/// Metadata key carrying the whole seconds until a rejected caller may retry.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Implementation of the AdmissionService gRPC interface.
///
/// Rejections are reported as `RESOURCE_EXHAUSTED`, the gRPC counterpart of
/// HTTP 429.
pub struct AdmissionServiceImpl<R: RateLimitBackend, K: KeyExtractor = PeerAddrKey> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Derives the caller key from each request
    extractor: K,
}

impl<R: RateLimitBackend> AdmissionServiceImpl<R> {
    /// Create a service keyed by peer address.
    pub fn new(rate_limiter: Arc<R>) -> Self {
        Self::with_extractor(rate_limiter, PeerAddrKey::default())
    }
}

impl<R: RateLimitBackend, K: KeyExtractor> AdmissionServiceImpl<R, K> {
    /// Create a service with a custom key extractor.
    pub fn with_extractor(rate_limiter: Arc<R>, extractor: K) -> Self {
        Self {
            rate_limiter,
            extractor,
        }
    }
}

/// Round up to whole seconds.
fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
}

#[tonic::async_trait]
impl<R, K> AdmissionService for AdmissionServiceImpl<R, K>
where
    R: RateLimitBackend + 'static,
    K: KeyExtractor + 'static,
{
    #[instrument(skip(self, request), fields(key = tracing::field::Empty))]
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let key = self.extractor.key(&request);
        tracing::Span::current().record("key", key.as_str());

        let decision = self.rate_limiter.check(&key).await;

        if !decision.allowed {
            let retry_after = retry_after_secs(decision.retry_after);
            debug!(key = %key, retry_after_secs = retry_after, "Rejecting request");

            let mut status = Status::resource_exhausted("Too Many Requests");
            status
                .metadata_mut()
                .insert(RETRY_AFTER_HEADER, MetadataValue::from(retry_after));
            return Err(status);
        }

        debug!(key = %key, remaining = decision.remaining, "Admitting request");

        Ok(Response::new(CheckResponse {
            remaining: decision.remaining,
        }))
    }
}
