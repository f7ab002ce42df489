//! Chain gateway: reads and writes against the resolution oracle.
//!
//! The resolver only depends on the [`ChainGateway`] trait. The alloy-backed
//! implementation lives in [`gateway`].

pub mod abi;
pub mod gateway;

use crate::market::{Market, MarketId};
use crate::predicate::Outcome;
use alloy::primitives::B256;
use async_trait::async_trait;
use thiserror::Error;

pub use gateway::AlloyChainGateway;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("transaction {tx} reverted")]
    Reverted { tx: String },
    /// Sent, but its receipt could not be fetched. It may still be mined.
    #[error("transaction {tx} sent but not confirmed")]
    Unconfirmed { tx: String },
    #[error("failed to decode chain data: {0}")]
    Decode(String),
    #[error("market {0} is not registered with the factory")]
    UnknownMarket(MarketId),
    #[error("invalid chain configuration: {0}")]
    Config(String),
}

impl ChainError {
    /// RPC hiccups and reverted submissions are worth another attempt.
    /// An unconfirmed transaction is not: re-sending could duplicate it.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::Reverted { .. })
    }
}

/// A committed-but-not-finalized outcome on the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingResolution {
    pub outcome: u8,
    pub data_hash: B256,
    pub commit_time: u64,
}

impl PendingResolution {
    pub fn finalizable_at(&self, dispute_window: u64) -> u64 {
        self.commit_time.saturating_add(dispute_window)
    }
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Current market parameters and settlement flags.
    async fn market(&self, market: MarketId) -> Result<Market, ChainError>;

    /// `None` if no commit has been submitted for the market.
    async fn pending_resolution(
        &self,
        market: MarketId,
    ) -> Result<Option<PendingResolution>, ChainError>;

    async fn dispute_window_seconds(&self) -> Result<u64, ChainError>;

    /// Submit a commit and wait for its receipt. Returns the tx hash.
    async fn commit(
        &self,
        market: MarketId,
        outcome: Outcome,
        data_hash: B256,
    ) -> Result<String, ChainError>;

    /// Submit a finalize and wait for its receipt. Returns the tx hash.
    async fn finalize(&self, market: MarketId) -> Result<String, ChainError>;
}
