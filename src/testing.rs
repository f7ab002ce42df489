//! Scripted collaborators shared by the unit tests.

use crate::chain::{ChainError, ChainGateway, PendingResolution};
use crate::clock::Clock;
use crate::datasource::{DataSource, DataSourceError};
use crate::market::{KindTag, Market, MarketId, Subject};
use crate::predicate::{ExtremumDirection, Outcome};
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub fn market_id(n: u8) -> MarketId {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    Address::from(bytes)
}

/// TOKEN_PRICE / EXTREMUM / GT 100, window [1000, 2000], resolvable at 2000.
pub fn sample_market(id: MarketId) -> Market {
    Market {
        id,
        subject_kind: KindTag::Name("TOKEN_PRICE".to_string()),
        window_kind: KindTag::Name("EXTREMUM".to_string()),
        predicate_op: KindTag::Name("GT".to_string()),
        subject_id: "0xtoken".to_string(),
        threshold: 100,
        value_decimals: 0,
        window_start: 1_000,
        window_end: 2_000,
        resolve_time: 2_000,
        resolved: false,
        cancelled: false,
        pool_yes: 100,
        pool_no: 0,
    }
}

#[derive(Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn at(now: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(now)))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory oracle: commits create a pending record stamped with the
/// clock, finalize marks the market resolved.
pub struct MockChain {
    clock: Arc<FixedClock>,
    pub market: Mutex<Market>,
    pub pending: Mutex<Option<PendingResolution>>,
    pub dispute_window: u64,
    pub commits: Mutex<Vec<(MarketId, Outcome, B256)>>,
    pub finalizes: Mutex<Vec<MarketId>>,
    /// Number of upcoming `market()` reads that fail with an RPC error.
    pub market_read_failures: AtomicU32,
    /// Number of upcoming commits that are sent but never mined.
    pub unmined_commits: AtomicU32,
}

impl MockChain {
    pub fn new(market: Market, clock: Arc<FixedClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            market: Mutex::new(market),
            pending: Mutex::new(None),
            dispute_window: 600,
            commits: Mutex::new(Vec::new()),
            finalizes: Mutex::new(Vec::new()),
            market_read_failures: AtomicU32::new(0),
            unmined_commits: AtomicU32::new(0),
        })
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn finalize_count(&self) -> usize {
        self.finalizes.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn market(&self, market: MarketId) -> Result<Market, ChainError> {
        let remaining = self.market_read_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.market_read_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ChainError::Rpc("connection reset".to_string()));
        }
        let current = self.market.lock().unwrap().clone();
        if current.id != market {
            return Err(ChainError::UnknownMarket(market));
        }
        Ok(current)
    }

    async fn pending_resolution(
        &self,
        _market: MarketId,
    ) -> Result<Option<PendingResolution>, ChainError> {
        Ok(*self.pending.lock().unwrap())
    }

    async fn dispute_window_seconds(&self) -> Result<u64, ChainError> {
        Ok(self.dispute_window)
    }

    async fn commit(
        &self,
        market: MarketId,
        outcome: Outcome,
        data_hash: B256,
    ) -> Result<String, ChainError> {
        self.commits.lock().unwrap().push((market, outcome, data_hash));
        let unmined = self.unmined_commits.load(Ordering::SeqCst);
        if unmined > 0 {
            self.unmined_commits.store(unmined - 1, Ordering::SeqCst);
            return Err(ChainError::Unconfirmed {
                tx: format!("0xcommit{}", self.commit_count()),
            });
        }
        *self.pending.lock().unwrap() = Some(PendingResolution {
            outcome: outcome.as_u8(),
            data_hash,
            commit_time: self.clock.now(),
        });
        Ok(format!("0xcommit{}", self.commit_count()))
    }

    async fn finalize(&self, market: MarketId) -> Result<String, ChainError> {
        self.finalizes.lock().unwrap().push(market);
        self.market.lock().unwrap().resolved = true;
        *self.pending.lock().unwrap() = None;
        Ok(format!("0xfinalize{}", self.finalize_count()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataCall {
    Snapshot { at: u64 },
    Average { start: u64, end: u64 },
    Extremum { start: u64, end: u64, direction: ExtremumDirection },
}

/// Returns `value` for every query after failing the first `failures` calls.
pub struct MockData {
    pub value: Decimal,
    pub failures: AtomicU32,
    pub calls: Mutex<Vec<DataCall>>,
}

impl MockData {
    pub fn returning(value: Decimal) -> Arc<Self> {
        Self::failing_then(0, value)
    }

    pub fn failing_then(failures: u32, value: Decimal) -> Arc<Self> {
        Arc::new(Self {
            value,
            failures: AtomicU32::new(failures),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, call: DataCall) -> Result<Decimal, DataSourceError> {
        self.calls.lock().unwrap().push(call);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DataSourceError::Unavailable("HTTP 503".to_string()));
        }
        Ok(self.value)
    }
}

#[async_trait]
impl DataSource for MockData {
    async fn snapshot_value(&self, _subject: &Subject, at: u64) -> Result<Decimal, DataSourceError> {
        self.answer(DataCall::Snapshot { at })
    }

    async fn time_average_value(
        &self,
        _subject: &Subject,
        start: u64,
        end: u64,
    ) -> Result<Decimal, DataSourceError> {
        self.answer(DataCall::Average { start, end })
    }

    async fn extremum_value(
        &self,
        _subject: &Subject,
        start: u64,
        end: u64,
        direction: ExtremumDirection,
    ) -> Result<Decimal, DataSourceError> {
        self.answer(DataCall::Extremum { start, end, direction })
    }
}
