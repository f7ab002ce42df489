//! Market resolution: the commit / dispute-window / finalize state machine.
//!
//! State is never stored locally. Every attempt re-reads the market and the
//! oracle's pending record and decides from scratch:
//!
//!   no pending record          -> evaluate predicate, submit commit
//!   pending, window still open -> report waiting, submit nothing
//!   pending, window elapsed    -> submit finalize
//!   resolved / cancelled       -> no-op
//!
//! Transient data-source and RPC failures are retried with a fixed delay up
//! to the configured attempt count; everything else fails the job at once.

pub mod resolver;

use crate::chain::ChainError;
use crate::datasource::DataSourceError;
use crate::market::MarketError;
use crate::predicate::Outcome;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use resolver::Resolver;

/// Reason reported once all attempts failed on transient errors.
pub const MAX_RETRIES_REASON: &str = "max retry attempts exceeded";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("observed value does not fit fixed-point at {decimals} decimals")]
    ValueOutOfRange { decimals: u32 },
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Chain(ChainError),
}

impl ResolveError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::DataSource(e) => e.is_transient(),
            ResolveError::Chain(e) => e.is_transient(),
            ResolveError::Configuration(_) | ResolveError::ValueOutOfRange { .. } => false,
        }
    }
}

impl From<MarketError> for ResolveError {
    fn from(e: MarketError) -> Self {
        ResolveError::Configuration(e.to_string())
    }
}

impl From<ChainError> for ResolveError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::UnknownMarket(_) | ChainError::Config(_) => {
                ResolveError::Configuration(e.to_string())
            }
            other => ResolveError::Chain(other),
        }
    }
}

/// Where a market stands in the two-phase protocol after a job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Unresolved,
    CommitSubmitted,
    AwaitingDispute,
    Finalized,
    Cancelled,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionState::Unresolved => write!(f, "UNRESOLVED"),
            ResolutionState::CommitSubmitted => write!(f, "COMMIT_SUBMITTED"),
            ResolutionState::AwaitingDispute => write!(f, "AWAITING_DISPUTE"),
            ResolutionState::Finalized => write!(f, "FINALIZED"),
            ResolutionState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Outcome of one job, handed back to whoever enqueued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    pub state: ResolutionState,
}

impl ResolutionResult {
    pub fn committed(outcome: Outcome, tx: String) -> Self {
        Self {
            success: true,
            outcome: Some(outcome.as_u8()),
            reason: None,
            transaction_hash: Some(tx),
            state: ResolutionState::CommitSubmitted,
        }
    }

    pub fn finalized(outcome: u8, tx: String) -> Self {
        Self {
            success: true,
            outcome: Some(outcome),
            reason: None,
            transaction_hash: Some(tx),
            state: ResolutionState::Finalized,
        }
    }

    /// Market already settled on-chain; nothing to do.
    pub fn settled(state: ResolutionState, reason: &str) -> Self {
        Self {
            success: true,
            outcome: None,
            reason: Some(reason.to_string()),
            transaction_hash: None,
            state,
        }
    }

    pub fn waiting(outcome: u8, finalizable_at: u64) -> Self {
        Self {
            success: false,
            outcome: Some(outcome),
            reason: Some(format!(
                "waiting for dispute window, finalizable at {}",
                finalizable_at
            )),
            transaction_hash: None,
            state: ResolutionState::AwaitingDispute,
        }
    }

    /// A transaction went out but was never confirmed; `state` is what it
    /// would have moved the market to.
    pub fn unconfirmed(state: ResolutionState, tx: String) -> Self {
        Self {
            success: false,
            outcome: None,
            reason: Some(format!("transaction {} sent but not confirmed", tx)),
            transaction_hash: Some(tx),
            state,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: None,
            reason: Some(reason.into()),
            transaction_hash: None,
            state: ResolutionState::Unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_retry_taxonomy() {
        assert!(ResolveError::DataSource(DataSourceError::Unavailable("503".into())).is_retryable());
        assert!(ResolveError::from(ChainError::Rpc("timeout".into())).is_retryable());
        assert!(!ResolveError::from(ChainError::UnknownMarket(Address::ZERO)).is_retryable());
        assert!(!ResolveError::from(ChainError::Unconfirmed { tx: "0xabc".into() }).is_retryable());
        assert!(!ResolveError::from(MarketError::UnknownKind {
            axis: "windowKind",
            tag: "7".into()
        })
        .is_retryable());
        assert!(!ResolveError::ValueOutOfRange { decimals: 30 }.is_retryable());
    }

    #[test]
    fn test_result_serialization() {
        let r = ResolutionResult::committed(Outcome::Yes, "0xabc".to_string());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["outcome"], 1);
        assert_eq!(json["transactionHash"], "0xabc");
        assert_eq!(json["state"], "commit_submitted");
        assert!(json.get("reason").is_none());

        let json = serde_json::to_value(ResolutionResult::failed(MAX_RETRIES_REASON)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "max retry attempts exceeded");
    }
}
