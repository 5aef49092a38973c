//! Error types for flora-catalog
//!
//! `FetchError` is scoped to one source and one call; the aggregator absorbs it.
//! `CatalogError` is what a whole by-id lookup can fail with.

use crate::types::SourceId;
use thiserror::Error;

/// Failure of a single source call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// HTTP 429; carries the message shown to the user
    #[error("{source_id} rate limited: {message}")]
    RateLimited { source_id: SourceId, message: String },

    /// Any other non-2xx status
    #[error("{source_id} request failed with HTTP {status}")]
    RequestFailed { source_id: SourceId, status: u16 },

    /// Connection, DNS, TLS or timeout failure
    #[error("{source_id} unreachable: {reason}")]
    Unreachable { source_id: SourceId, reason: String },

    /// Payload too broken to apply defaults to
    #[error("{source_id} sent a malformed response: {reason}")]
    MalformedResponse { source_id: SourceId, reason: String },
}

impl FetchError {
    pub fn rate_limited(source: SourceId) -> Self {
        FetchError::RateLimited {
            source_id: source,
            message: format!(
                "{} is receiving too many requests right now. Wait a minute and try again.",
                source
            ),
        }
    }

    pub fn source_id(&self) -> SourceId {
        match self {
            FetchError::RateLimited { source_id, .. }
            | FetchError::RequestFailed { source_id, .. }
            | FetchError::Unreachable { source_id, .. }
            | FetchError::MalformedResponse { source_id, .. } => *source_id,
        }
    }

    /// Only transport-level and status failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RequestFailed { .. } | FetchError::Unreachable { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// Message suitable for direct display
    pub fn user_message(&self) -> String {
        match self {
            FetchError::RateLimited { message, .. } => message.clone(),
            other => format!("Could not load results from {}.", other.source_id()),
        }
    }
}

/// Failure of a whole catalog operation
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Caller asked a disabled source for a record
    #[error("Source {0} is disabled in configuration")]
    SourceDisabled(SourceId),

    /// Record id does not start with a known source tag
    #[error("Unknown record id: {0}")]
    UnknownId(String),

    /// The source failed and no cached copy was available
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Result type for catalog lookups
pub type CatalogResult<T> = Result<T, CatalogError>;
