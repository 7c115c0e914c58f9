use crate::core::rate_limit::Action;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced to callers of the session.
///
/// Every failure leaving a component goes through [`classify`] or is built
/// directly as one of these kinds, so callers never match on transport text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReclaimError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("All {attempts} RPC endpoints are unavailable (last error: {last_error})")]
    AllEndpointsUnavailable { attempts: usize, last_error: String },

    #[error("Token account scan failed: {0}")]
    ScanFailed(String),

    #[error("No abandoned accounts to claim")]
    NothingToClaim,

    #[error("Please wait {retry_after:?} before trying to {action} again")]
    RateLimited { action: Action, retry_after: Duration },

    #[error("Transaction rejected by the ledger: {0}")]
    TransactionRejected(String),

    #[error("Transaction {signature} was not confirmed in time; it may still land")]
    ConfirmationTimeout { signature: String },

    #[error("Claim request failed: {0}")]
    ClaimRequestFailed(String),

    #[error("Network connection error. Please try again later.")]
    NetworkAccessDenied,

    #[error("{0}")]
    Unclassified(String),
}

impl ReclaimError {
    /// Whether the same call may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllEndpointsUnavailable { .. }
                | Self::ScanFailed(_)
                | Self::RateLimited { .. }
                | Self::NetworkAccessDenied
        )
    }
}

/// HTTP 403 as rendered by reqwest and by JSON-RPC gateways.
const ACCESS_DENIED: &[&str] = &["403 forbidden", "status 403", "status: 403", "http 403"];

const REJECTED: &[&str] = &[
    "transaction too large",
    "too large",
    "transaction simulation failed",
    "blockhash not found",
    "insufficient funds",
    "custom program error",
    "invalid transaction",
    "signature verification failure",
];

const UNCONFIRMED: &[&str] = &["was not confirmed in"];

/// Maps a raw transport or provider message onto the error taxonomy.
pub fn classify(raw: &str) -> ReclaimError {
    let lowered = raw.to_lowercase();
    let matches_any = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if matches_any(ACCESS_DENIED) {
        ReclaimError::NetworkAccessDenied
    } else if matches_any(UNCONFIRMED) {
        ReclaimError::ConfirmationTimeout {
            signature: String::new(),
        }
    } else if matches_any(REJECTED) {
        ReclaimError::TransactionRejected(raw.to_string())
    } else {
        ReclaimError::Unclassified(raw.to_string())
    }
}

/// Same as [`classify`], but an HTTP status, when known, takes precedence.
pub fn classify_status(status: Option<u16>, raw: &str) -> ReclaimError {
    match status {
        Some(403) => ReclaimError::NetworkAccessDenied,
        _ => classify(raw),
    }
}
