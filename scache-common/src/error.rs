//! # Error Taxonomy
//!
//! Purpose: Collapse every failure a cache call can produce (client-side
//! validation, transport faults, service status codes) into one closed set of
//! kinds that callers match on without touching transport types.
//!
//! ## Design Principles
//! 1. **Closed Set**: `ErrorKind` is exhaustive; every gRPC code folds into it.
//! 2. **Total Mapping**: `map_failure` accepts any error value and always
//!    yields a `CacheError`, never a second failure.
//! 3. **Idempotence**: Mapping a `CacheError` again returns it unchanged.
//! 4. **Detail Preserved**: The originating status code, message, and
//!    metadata stay attached for callers building their own retry policy.
//!
//! ## Status Mapping
//!
//! ```text
//! InvalidArgument | Unimplemented | OutOfRange  -> BadRequest
//! FailedPrecondition                            -> FailedPrecondition
//! Cancelled                                     -> Cancelled
//! DeadlineExceeded                              -> Timeout
//! PermissionDenied                              -> PermissionDenied
//! Unauthenticated                               -> Authentication
//! ResourceExhausted                             -> LimitExceeded(reason)
//! NotFound                                      -> NotFound
//! AlreadyExists                                 -> AlreadyExists
//! Unknown                                       -> UnknownService
//! Aborted | Internal | DataLoss                 -> Internal
//! Unavailable                                   -> ServerUnavailable
//!                                                  (Connection if the status
//!                                                   wraps a transport error)
//! Ok                                            -> Unknown
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::io;

use tonic::metadata::MetadataMap;
use tonic::{Code, Status};

/// Result type for fallible cache-client plumbing.
pub type CacheResult<T> = Result<T, CacheError>;

/// Metadata key the service uses to tag the machine-readable failure cause.
pub const ERROR_CAUSE_METADATA_KEY: &str = "err";

/// Refinement of [`ErrorKind::LimitExceeded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitExceededReason {
    TopicSubscriptions,
    OperationRate,
    Throughput,
    RequestSize,
    ItemSize,
    ElementSize,
    Unknown,
}

impl LimitExceededReason {
    /// Parses the service's `err` metadata tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "topic_subscriptions_limit_exceeded" => Some(LimitExceededReason::TopicSubscriptions),
            "operations_rate_limit_exceeded" => Some(LimitExceededReason::OperationRate),
            "throughput_rate_limit_exceeded" => Some(LimitExceededReason::Throughput),
            "request_size_limit_exceeded" => Some(LimitExceededReason::RequestSize),
            "item_size_limit_exceeded" => Some(LimitExceededReason::ItemSize),
            "element_size_limit_exceeded" => Some(LimitExceededReason::ElementSize),
            _ => None,
        }
    }

    /// Guesses the reason from free-form status text (case-insensitive).
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("subscribers") {
            LimitExceededReason::TopicSubscriptions
        } else if lower.contains("operations") {
            LimitExceededReason::OperationRate
        } else if lower.contains("throughput") {
            LimitExceededReason::Throughput
        } else if lower.contains("request limit") || lower.contains("request size") {
            LimitExceededReason::RequestSize
        } else if lower.contains("item size") {
            LimitExceededReason::ItemSize
        } else if lower.contains("element size") {
            LimitExceededReason::ElementSize
        } else {
            LimitExceededReason::Unknown
        }
    }

    /// Picks the reason: explicit tag first, then message text, then `Unknown`.
    pub fn resolve(tag: Option<&str>, message: &str) -> Self {
        tag.and_then(Self::from_tag)
            .unwrap_or_else(|| Self::from_message(message))
    }

    /// Machine-readable tag, matching the service's `err` metadata values.
    pub fn tag(self) -> &'static str {
        match self {
            LimitExceededReason::TopicSubscriptions => "topic_subscriptions_limit_exceeded",
            LimitExceededReason::OperationRate => "operations_rate_limit_exceeded",
            LimitExceededReason::Throughput => "throughput_rate_limit_exceeded",
            LimitExceededReason::RequestSize => "request_size_limit_exceeded",
            LimitExceededReason::ItemSize => "item_size_limit_exceeded",
            LimitExceededReason::ElementSize => "element_size_limit_exceeded",
            LimitExceededReason::Unknown => "unknown_limit_exceeded",
        }
    }

    pub fn explanation(self) -> &'static str {
        match self {
            LimitExceededReason::TopicSubscriptions => {
                "Topic subscriptions limit exceeded for this account"
            }
            LimitExceededReason::OperationRate => "Request rate limit exceeded for this account",
            LimitExceededReason::Throughput => "Bandwidth limit exceeded for this account",
            LimitExceededReason::RequestSize => "Request size limit exceeded for this account",
            LimitExceededReason::ItemSize => "Item size limit exceeded for this account",
            LimitExceededReason::ElementSize => "Element size limit exceeded for this account",
            LimitExceededReason::Unknown => "Limit exceeded for this account",
        }
    }
}

/// Closed set of error kinds surfaced by every cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client-side validation failed before any network call.
    InvalidArgument,
    /// The service responded in a way the client does not recognize.
    UnknownService,
    AlreadyExists,
    NotFound,
    Internal,
    PermissionDenied,
    /// Bad or missing credential.
    Authentication,
    Cancelled,
    /// The transport could not reach the service.
    Connection,
    LimitExceeded(LimitExceededReason),
    /// The service rejected the request as malformed.
    BadRequest,
    /// The per-call deadline elapsed.
    Timeout,
    ServerUnavailable,
    FailedPrecondition,
    /// Catch-all for failures with no recognizable cause.
    Unknown,
}

impl ErrorKind {
    /// Maps a gRPC status code onto the taxonomy.
    ///
    /// `ResourceExhausted` yields `LimitExceeded(Unknown)`; the reason is
    /// refined by `CacheError::from(Status)` where the message and metadata
    /// are available.
    pub fn from_code(code: Code) -> Self {
        match code {
            Code::InvalidArgument | Code::Unimplemented | Code::OutOfRange => ErrorKind::BadRequest,
            Code::FailedPrecondition => ErrorKind::FailedPrecondition,
            Code::Cancelled => ErrorKind::Cancelled,
            Code::DeadlineExceeded => ErrorKind::Timeout,
            Code::PermissionDenied => ErrorKind::PermissionDenied,
            Code::Unauthenticated => ErrorKind::Authentication,
            Code::ResourceExhausted => ErrorKind::LimitExceeded(LimitExceededReason::Unknown),
            Code::NotFound => ErrorKind::NotFound,
            Code::AlreadyExists => ErrorKind::AlreadyExists,
            Code::Unknown => ErrorKind::UnknownService,
            Code::Aborted | Code::Internal | Code::DataLoss => ErrorKind::Internal,
            Code::Unavailable => ErrorKind::ServerUnavailable,
            Code::Ok => ErrorKind::Unknown,
        }
    }

    /// Stable identifier, suitable for logs and alerting.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT_ERROR",
            ErrorKind::UnknownService => "UNKNOWN_SERVICE_ERROR",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS_ERROR",
            ErrorKind::NotFound => "NOT_FOUND_ERROR",
            ErrorKind::Internal => "INTERNAL_SERVER_ERROR",
            ErrorKind::PermissionDenied => "PERMISSION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Cancelled => "CANCELLED_ERROR",
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::LimitExceeded(_) => "LIMIT_EXCEEDED_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::ServerUnavailable => "SERVER_UNAVAILABLE",
            ErrorKind::FailedPrecondition => "FAILED_PRECONDITION_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Fixed guidance text shared by every error of this kind.
    pub fn explanation(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "Invalid argument passed to the cache client",
            ErrorKind::UnknownService => "Service returned an unexpected response",
            ErrorKind::AlreadyExists => "A resource with the specified name already exists",
            ErrorKind::NotFound => "The specified resource does not exist",
            ErrorKind::Internal => "The service encountered an unexpected internal error",
            ErrorKind::PermissionDenied => "Insufficient permissions to perform this operation",
            ErrorKind::Authentication => "Invalid or missing authentication credentials",
            ErrorKind::Cancelled => "The request was cancelled before it completed",
            ErrorKind::Connection => "Unable to connect to the cache service",
            ErrorKind::LimitExceeded(reason) => reason.explanation(),
            ErrorKind::BadRequest => "The service rejected the request as invalid",
            ErrorKind::Timeout => {
                "The client's configured timeout was exceeded; consider a more lenient timeout"
            }
            ErrorKind::ServerUnavailable => "The service was temporarily unavailable",
            ErrorKind::FailedPrecondition => {
                "The system was not in a state required for the operation's execution"
            }
            ErrorKind::Unknown => "An unknown error occurred",
        }
    }

    /// True for transient kinds where retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Connection
                | ErrorKind::ServerUnavailable
                | ErrorKind::Timeout
                | ErrorKind::LimitExceeded(_)
                | ErrorKind::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw status details kept from the transport.
#[derive(Debug, Clone)]
pub struct TransportDetails {
    code: Code,
    message: String,
    metadata: MetadataMap,
}

impl TransportDetails {
    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }
}

/// A mapped failure: kind, specific detail, and optional transport details.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}: {}", .kind, .kind.explanation(), .detail)]
pub struct CacheError {
    kind: ErrorKind,
    detail: String,
    transport: Option<TransportDetails>,
}

impl CacheError {
    /// Creates an error without transport details.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        CacheError {
            kind,
            detail: detail.into(),
            transport: None,
        }
    }

    /// Client-side validation failure.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        CacheError::new(ErrorKind::InvalidArgument, detail)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The specific, per-occurrence detail.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn explanation(&self) -> &'static str {
        self.kind.explanation()
    }

    /// Full human-readable message (same text as `Display`).
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn limit_reason(&self) -> Option<LimitExceededReason> {
        match self.kind {
            ErrorKind::LimitExceeded(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn transport(&self) -> Option<&TransportDetails> {
        self.transport.as_ref()
    }

    pub fn transport_code(&self) -> Option<Code> {
        self.transport.as_ref().map(TransportDetails::code)
    }

    pub fn transport_message(&self) -> Option<&str> {
        self.transport.as_ref().map(TransportDetails::message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<Status> for CacheError {
    fn from(status: Status) -> Self {
        let code = status.code();
        let kind = match ErrorKind::from_code(code) {
            ErrorKind::ServerUnavailable if wraps_transport_error(&status) => ErrorKind::Connection,
            ErrorKind::LimitExceeded(_) => {
                let tag = status
                    .metadata()
                    .get(ERROR_CAUSE_METADATA_KEY)
                    .and_then(|value| value.to_str().ok());
                ErrorKind::LimitExceeded(LimitExceededReason::resolve(tag, status.message()))
            }
            kind => kind,
        };

        let detail = if status.message().is_empty() {
            code.description().to_string()
        } else {
            status.message().to_string()
        };

        CacheError {
            kind,
            detail,
            transport: Some(TransportDetails {
                code,
                message: status.message().to_string(),
                metadata: status.metadata().clone(),
            }),
        }
    }
}

/// Maps any failure into the taxonomy.
///
/// Recognizes, in order: an existing `CacheError` (returned unchanged), a
/// `tonic::Status`, a transport or connectivity I/O error, and an elapsed
/// deadline. When the outer value is none of these, exactly one level of
/// `source()` is inspected before falling back to `ErrorKind::Unknown`.
pub fn map_failure(failure: Box<dyn StdError + Send + Sync + 'static>) -> CacheError {
    let failure = match failure.downcast::<CacheError>() {
        Ok(mapped) => return *mapped,
        Err(other) => other,
    };

    if let Some(mapped) = recognize(&*failure) {
        return mapped;
    }
    if let Some(mapped) = failure.source().and_then(recognize) {
        return mapped;
    }
    CacheError::new(ErrorKind::Unknown, failure.to_string())
}

fn recognize(failure: &(dyn StdError + 'static)) -> Option<CacheError> {
    if let Some(mapped) = failure.downcast_ref::<CacheError>() {
        return Some(mapped.clone());
    }
    if let Some(status) = failure.downcast_ref::<Status>() {
        return Some(CacheError::from(status.clone()));
    }
    if failure.is::<tonic::transport::Error>() {
        return Some(CacheError::new(ErrorKind::Connection, failure.to_string()));
    }
    if let Some(err) = failure.downcast_ref::<io::Error>() {
        if err.kind() == io::ErrorKind::TimedOut {
            return Some(CacheError::new(ErrorKind::Timeout, err.to_string()));
        }
        if is_connectivity(err.kind()) {
            return Some(CacheError::new(ErrorKind::Connection, err.to_string()));
        }
    }
    if failure.is::<tokio::time::error::Elapsed>() {
        return Some(CacheError::new(ErrorKind::Timeout, failure.to_string()));
    }
    None
}

fn wraps_transport_error(status: &Status) -> bool {
    status.source().is_some_and(|source| {
        source.is::<tonic::transport::Error>()
            || source
                .downcast_ref::<io::Error>()
                .is_some_and(|err| is_connectivity(err.kind()))
    })
}

fn is_connectivity(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
    )
}
