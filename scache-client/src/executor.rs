//! # Request Executor
//!
//! Purpose: Run one unary call with the per-call metadata attached and an
//! absolute deadline enforced, funnelling every failure into `CacheError`.
//!
//! ## Call Shape
//! 1. Build `cache`, `authorization` and `agent` metadata, exactly once each.
//! 2. Fix the deadline as `now + timeout` before invoking the stub.
//! 3. Race the stub against the deadline; map status or elapsed to an error.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Request, Response, Status};
use tracing::warn;

use scache_common::{map_failure, ttl_millis, CacheError, CacheResult, ErrorKind};

/// Metadata key naming the target cache.
pub const CACHE_HEADER: &str = "cache";
/// Metadata key carrying the credential.
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Metadata key identifying this client library.
pub const AGENT_HEADER: &str = "agent";

/// Client identifier sent in the `agent` header, e.g. `rust:0.1.0`.
pub fn agent() -> String {
    format!("rust:{}", env!("CARGO_PKG_VERSION"))
}

/// Attaches call metadata and enforces deadlines for unary calls.
#[derive(Clone)]
pub struct RequestExecutor {
    authorization: AsciiMetadataValue,
    agent: AsciiMetadataValue,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(auth_token: &str) -> CacheResult<Self> {
        let authorization = AsciiMetadataValue::try_from(auth_token).map_err(|_| {
            CacheError::new(
                ErrorKind::Authentication,
                "auth token is not a valid header value",
            )
        })?;
        let agent = agent()
            .parse::<AsciiMetadataValue>()
            .map_err(|_| CacheError::new(ErrorKind::Internal, "agent is not a valid header value"))?;
        Ok(RequestExecutor {
            authorization,
            agent,
        })
    }

    /// Builds the metadata attached to a call against `cache_name`.
    pub fn call_metadata(&self, cache_name: &str) -> CacheResult<MetadataMap> {
        let invalid = || {
            CacheError::invalid_argument(format!(
                "cache name {cache_name:?} is not a valid header value"
            ))
        };
        // Header parsing tolerates obs-text bytes, so check printable ascii first.
        if !is_header_safe(cache_name) {
            return Err(invalid());
        }
        let cache = AsciiMetadataValue::try_from(cache_name).map_err(|_| invalid())?;
        let mut metadata = MetadataMap::with_capacity(4);
        metadata.insert(CACHE_HEADER, cache);
        metadata.insert(AUTHORIZATION_HEADER, self.authorization.clone());
        metadata.insert(AGENT_HEADER, self.agent.clone());
        Ok(metadata)
    }

    /// Invokes `invoke` with a prepared request and waits at most `timeout`.
    ///
    /// `invoke` is not called when the metadata cannot be built.
    pub async fn execute<Req, Resp, F, Fut>(
        &self,
        cache_name: &str,
        timeout: Duration,
        message: Req,
        invoke: F,
    ) -> CacheResult<Resp>
    where
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let metadata = self.call_metadata(cache_name)?;
        let deadline = deadline_after(timeout);

        let mut request = Request::new(message);
        *request.metadata_mut() = metadata;
        request.set_timeout(timeout);

        match tokio::time::timeout_at(deadline, invoke(request)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => {
                let err = map_failure(Box::new(status));
                warn!(cache = cache_name, kind = %err.kind(), detail = err.detail(), "call failed");
                Err(err)
            }
            Err(elapsed) => {
                let err = map_failure(Box::new(elapsed));
                warn!(
                    cache = cache_name,
                    timeout_ms = ttl_millis(timeout),
                    "call exceeded deadline"
                );
                Err(err)
            }
        }
    }
}

/// True when every byte of `value` is printable ascii.
pub(crate) fn is_header_safe(value: &str) -> bool {
    value.bytes().all(|b| (0x20..0x7f).contains(&b))
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    // Far enough out to never fire for any realistic call.
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}
