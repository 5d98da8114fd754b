//! # error
//!
//! Centralised application error type.
//!
//! Every handler and every scheduler step returns `Result<_, AppError>`.
//! Axum's `IntoResponse` impl converts these into structured JSON error
//! bodies so API clients always get a machine-readable `kind` plus a
//! human-readable message — a user who is out of virtual funds must see
//! "Insufficient balance", never a generic failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

// ─── RejectReason ─────────────────────────────────────────────────────────────

/// Why the ledger refused a mutating call.
///
/// Parsed from the gateway's revert reason by substring, the same way the
/// original web client classified contract error messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InsufficientBalance,
    /// Stake below the $10 minimum.
    BelowMinStake,
    /// Caller already holds a position at this (day, tier).
    DuplicatePosition,
    /// Mutating call targeted a day that is not active.
    MarketInactive,
    /// `start_new_day` while the previous day is still open.
    MarketStillActive,
    /// `close_position` before the day's closing price is committed.
    MarketUnresolved,
    /// Position was already settled — the claimed latch is one-way.
    AlreadyClaimed,
    BonusAlreadyClaimed,
    NoPosition,
    NoAccount,
    AccountExists,
    /// The signer refused to authorize the transaction.
    Declined,
    Other(String),
}

impl RejectReason {
    /// Classify a raw revert reason string from the chain gateway.
    pub fn from_revert(reason: &str) -> Self {
        let r = reason.to_lowercase();

        if r.contains("insufficient") {
            RejectReason::InsufficientBalance
        } else if r.contains("minimum") || r.contains("min stake") {
            RejectReason::BelowMinStake
        } else if r.contains("already have position") || r.contains("duplicate position") {
            RejectReason::DuplicatePosition
        } else if r.contains("not active") || r.contains("trading closed") {
            RejectReason::MarketInactive
        } else if r.contains("still active") {
            RejectReason::MarketStillActive
        } else if r.contains("not resolved") {
            RejectReason::MarketUnresolved
        } else if r.contains("bonus already") || r.contains("already claimed today") {
            RejectReason::BonusAlreadyClaimed
        } else if r.contains("already claimed") {
            RejectReason::AlreadyClaimed
        } else if r.contains("no position") {
            RejectReason::NoPosition
        } else if r.contains("no account") || r.contains("not initialized") {
            RejectReason::NoAccount
        } else if r.contains("account exists") || r.contains("already initialized") {
            RejectReason::AccountExists
        } else if r.contains("user rejected") || r.contains("declined") {
            RejectReason::Declined
        } else {
            RejectReason::Other(reason.to_string())
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientBalance => write!(f, "Insufficient balance"),
            RejectReason::BelowMinStake => write!(f, "Position below the minimum stake"),
            RejectReason::DuplicatePosition => {
                write!(f, "Already have a position at this leverage for today")
            }
            RejectReason::MarketInactive => write!(f, "Trading not active for this day"),
            RejectReason::MarketStillActive => write!(f, "Previous day is still active"),
            RejectReason::MarketUnresolved => write!(f, "Market not resolved yet"),
            RejectReason::AlreadyClaimed => write!(f, "Position already claimed"),
            RejectReason::BonusAlreadyClaimed => write!(f, "Daily bonus already claimed"),
            RejectReason::NoPosition => write!(f, "No position found"),
            RejectReason::NoAccount => write!(f, "Account not initialized"),
            RejectReason::AccountExists => write!(f, "Account already initialized"),
            RejectReason::Declined => write!(f, "Transaction declined by signer"),
            RejectReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// Upstream quote fetch failed or returned a malformed payload.
    /// Callers must propagate — never substitute a stale or synthetic price.
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The ledger-mutating call reverted.
    #[error("Ledger rejected: {0}")]
    LedgerRejected(RejectReason),

    /// The submission did not reach finality within the bounded window.
    #[error("Ledger timeout: {0}")]
    LedgerTimeout(String),

    /// A step failed inside an automated cycle; the whole cycle was aborted
    /// and recovery is deferred to the next scheduled or manual trigger.
    #[error("Market cycle aborted: {0}")]
    CycleAborted(String),

    /// A cycle is already in flight — overlapping cycles are never run.
    #[error("A market cycle is already in flight")]
    CycleInFlight,

    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable discriminator for JSON error bodies.
    fn kind(&self) -> &'static str {
        match self {
            AppError::OracleUnavailable(_) => "ORACLE_UNAVAILABLE",
            AppError::LedgerRejected(_) => "LEDGER_REJECTED",
            AppError::LedgerTimeout(_) => "LEDGER_TIMEOUT",
            AppError::CycleAborted(_) => "CYCLE_ABORTED",
            AppError::CycleInFlight => "CYCLE_IN_FLIGHT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::LedgerRejected(_) | AppError::CycleInFlight => StatusCode::CONFLICT,
            AppError::LedgerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::OracleUnavailable(_) | AppError::CycleAborted(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let reject = match &self {
            AppError::LedgerRejected(reason) => Some(reason.clone()),
            _ => None,
        };

        let body = Json(json!({
            "ok":     false,
            "kind":   self.kind(),
            "error":  self.to_string(),
            "reject": reject,
        }));

        (status, body).into_response()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_reason_classification() {
        assert_eq!(
            RejectReason::from_revert("Insufficient balance"),
            RejectReason::InsufficientBalance
        );
        assert_eq!(
            RejectReason::from_revert("Already have position for this leverage"),
            RejectReason::DuplicatePosition
        );
        assert_eq!(
            RejectReason::from_revert("Trading not active"),
            RejectReason::MarketInactive
        );
        assert_eq!(
            RejectReason::from_revert("Market not resolved"),
            RejectReason::MarketUnresolved
        );
        assert_eq!(
            RejectReason::from_revert("Already claimed"),
            RejectReason::AlreadyClaimed
        );
        assert_eq!(
            RejectReason::from_revert("Bonus already claimed"),
            RejectReason::BonusAlreadyClaimed
        );
        assert_eq!(
            RejectReason::from_revert("user rejected transaction"),
            RejectReason::Declined
        );
    }

    #[test]
    fn test_unknown_revert_reason_preserved() {
        let reason = RejectReason::from_revert("execution reverted: weird edge");
        assert_eq!(
            reason,
            RejectReason::Other("execution reverted: weird edge".to_string())
        );
        assert_eq!(reason.to_string(), "execution reverted: weird edge");
    }
}
