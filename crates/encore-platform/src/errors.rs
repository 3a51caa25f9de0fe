//! Error taxonomy for feed fetches and platform actions.
//!
//! `FetchError` means the external source could not produce items this
//! cycle; the caller skips the cycle and retries on the next tick.
//! `ActionError` means a platform call failed; whether it is worth one
//! immediate retry is carried on the error itself, the way outbound
//! delivery errors expose `retryable` for runtime retry coordination.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
/// A feed source failed to produce observed items for one poll cycle.
pub enum FetchError {
    #[error("feed request failed: {detail}")]
    Transport { detail: String },
    #[error("feed request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("feed returned HTTP {status}")]
    Status { status: u16 },
    #[error("feed response could not be decoded: {detail}")]
    Decode { detail: String },
}

impl FetchError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "fetch_transport_error",
            Self::Timeout { .. } => "fetch_timeout",
            Self::Status { .. } => "fetch_http_status",
            Self::Decode { .. } => "fetch_decode_error",
        }
    }
}

#[derive(Debug, Clone, Error)]
/// A chat-platform call failed.
pub enum ActionError {
    /// The target of the call no longer exists. Delete paths treat this as
    /// success; it is never worth a retry.
    #[error("action target not found")]
    NotFound,
    #[error("platform call failed ({reason_code}): {detail}")]
    Failed {
        reason_code: String,
        retryable: bool,
        detail: String,
    },
}

impl ActionError {
    pub fn terminal(reason_code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason_code: reason_code.into(),
            retryable: false,
            detail: detail.into(),
        }
    }

    pub fn retryable(reason_code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason_code: reason_code.into(),
            retryable: true,
            detail: detail.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { retryable: true, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn reason_code(&self) -> &str {
        match self {
            Self::NotFound => "target_not_found",
            Self::Failed { reason_code, .. } => reason_code.as_str(),
        }
    }
}
