use thiserror::Error;

use crate::api::{CallKind, Ticket};

/// Outcome of a collaborator call that did not produce a usable reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never reached the server or the connection dropped.
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered but the body could not be decoded.
    #[error("malformed reply: {0}")]
    Decode(String),
}

impl ApiError {
    /// Transient failures are retried (flush) or skipped (poll). Everything
    /// else is the server refusing the request on its merits.
    ///
    /// An undecodable body is treated as transient: requeueing can at worst
    /// resend a batch the server already counted, dropping it loses taps.
    /// So is 401: an expired credential says nothing about the batch, and
    /// the host can hand in a fresh one with `Session::set_credential`.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout | ApiError::Decode(_) => true,
            ApiError::Status { status, .. } => {
                *status >= 500 || matches!(*status, 401 | 408 | 429)
            }
        }
    }
}

/// Misuse of the completion API by the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("no request in flight for {0:?}")]
    UnknownTicket(Ticket),

    #[error("{ticket:?} was issued for {issued:?} but completed as {completed:?}")]
    MismatchedCall {
        ticket: Ticket,
        issued: CallKind,
        completed: CallKind,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config field `{field}` {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to serialize pending taps: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Storage(String),
}
