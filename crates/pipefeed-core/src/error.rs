//! Error types for pipefeed-core

use thiserror::Error;

/// Failures reported by a [`Gateway`](crate::gateway::Gateway) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The external service answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (connect, TLS, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// The requested object does not exist in the project
    #[error("not found: {0}")]
    NotFound(String),

    /// The gateway is missing required configuration
    #[error("gateway misconfigured: {0}")]
    Config(String),
}

/// Errors surfaced by the feed engine to its callers.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Upstream call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("merge request !{iid} is not open (state={state})")]
    MergeRequestNotOpen { iid: u64, state: String },

    #[error("merge request !{0} is a draft")]
    MergeRequestDraft(u64),

    #[error("merge request !{0} has conflicts")]
    MergeConflicts(u64),

    #[error("merge request !{0} has unresolved blocking discussions")]
    UnresolvedDiscussions(u64),

    #[error("merge request !{iid} cannot be accepted (merge_status={status})")]
    NotMergeable { iid: u64, status: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
