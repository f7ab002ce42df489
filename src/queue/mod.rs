//! Bounded-concurrency resolution queue.
//!
//! - Submissions never block: they go onto an unbounded channel.
//! - A single dispatcher task admits jobs, at most `concurrency` running at
//!   once and at most `concurrency` starts per rate interval.
//! - A market that is already queued or running is coalesced into the
//!   existing job, so one market never has two resolvers racing on it.
//! - Shutdown stops admissions and waits for everything already admitted.

mod rate;

use crate::market::MarketId;
use crate::resolution::{ResolutionResult, ResolutionState, Resolver};
use async_trait::async_trait;
use dashmap::DashSet;
use rate::RateWindow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("resolution queue is shutting down")]
    ShuttingDown,
}

/// Anything that can run one resolution job to completion.
#[async_trait]
pub trait ResolutionHandler: Send + Sync + 'static {
    async fn resolve(&self, market: MarketId) -> ResolutionResult;
}

#[async_trait]
impl ResolutionHandler for Resolver {
    async fn resolve(&self, market: MarketId) -> ResolutionResult {
        Resolver::resolve(self, market).await
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// Market already queued or running; folded into that job.
    Coalesced,
}

/// Result of a finished job, forwarded to the optional report channel.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub market: MarketId,
    pub result: ResolutionResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Admitted, waiting for a slot.
    pub size: usize,
    /// Currently running.
    pub pending: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub rate_interval: Duration,
}

struct Shared {
    sender: Mutex<Option<mpsc::UnboundedSender<MarketId>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// Markets queued or running.
    active: DashSet<MarketId>,
    queued: AtomicUsize,
    running: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to the scheduler. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct ResolutionQueue {
    shared: Arc<Shared>,
}

impl ResolutionQueue {
    /// Spawn the dispatcher. Must be called inside a tokio runtime.
    pub fn start(
        handler: Arc<dyn ResolutionHandler>,
        settings: QueueSettings,
        reports: Option<mpsc::UnboundedSender<JobReport>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            sender: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(None),
            active: DashSet::new(),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        });

        let handle = tokio::spawn(dispatch(shared.clone(), handler, rx, settings, reports));
        *lock(&shared.dispatcher) = Some(handle);

        info!(
            concurrency = settings.concurrency,
            rate_interval_ms = settings.rate_interval.as_millis() as u64,
            "resolution queue started"
        );
        Self { shared }
    }

    /// Hand a market to the queue without waiting for it to run.
    pub fn submit(&self, market: MarketId) -> Result<Admission, QueueError> {
        let sender = lock(&self.shared.sender);
        let tx = sender.as_ref().ok_or(QueueError::ShuttingDown)?;

        if !self.shared.active.insert(market) {
            debug!(market = %market, "resolution already in flight, coalesced");
            return Ok(Admission::Coalesced);
        }

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if tx.send(market).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            self.shared.active.remove(&market);
            return Err(QueueError::ShuttingDown);
        }

        debug!(market = %market, "resolution queued");
        Ok(Admission::Queued)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            size: self.shared.queued.load(Ordering::SeqCst),
            pending: self.shared.running.load(Ordering::SeqCst),
        }
    }

    pub fn is_accepting(&self) -> bool {
        lock(&self.shared.sender).is_some()
    }

    /// Stop admissions, then wait for every admitted job to finish.
    /// In-flight chain transactions are never aborted.
    pub async fn shutdown(&self) {
        let sender = lock(&self.shared.sender).take();
        drop(sender);

        let handle = lock(&self.shared.dispatcher).take();
        if let Some(handle) = handle {
            info!(stats = ?self.stats(), "draining resolution queue");
            if let Err(e) = handle.await {
                error!(error = %e, "resolution dispatcher panicked");
            }
        }
    }
}

/// Releases the market's dedup entry and running count when a job ends,
/// including when it panics.
struct JobGuard {
    shared: Arc<Shared>,
    market: MarketId,
    _slot: OwnedSemaphorePermit,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.shared.active.remove(&self.market);
        self.shared.running.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    handler: Arc<dyn ResolutionHandler>,
    mut rx: mpsc::UnboundedReceiver<MarketId>,
    settings: QueueSettings,
    reports: Option<mpsc::UnboundedSender<JobReport>>,
) {
    let concurrency = settings.concurrency.max(1);
    let slots = Arc::new(Semaphore::new(concurrency));
    let mut rate = RateWindow::new(concurrency, settings.rate_interval);
    let mut jobs = JoinSet::new();

    while let Some(market) = rx.recv().await {
        let slot = match slots.clone().acquire_owned().await {
            Ok(slot) => slot,
            Err(_) => break,
        };
        rate.acquire().await;

        shared.queued.fetch_sub(1, Ordering::SeqCst);
        shared.running.fetch_add(1, Ordering::SeqCst);
        let guard = JobGuard {
            shared: shared.clone(),
            market,
            _slot: slot,
        };

        let handler = handler.clone();
        let reports = reports.clone();
        jobs.spawn(async move {
            let result = handler.resolve(market).await;
            log_result(market, &result);
            drop(guard);
            if let Some(tx) = reports {
                let _ = tx.send(JobReport { market, result });
            }
        });

        while let Some(done) = jobs.try_join_next() {
            if let Err(e) = done {
                error!(error = %e, "resolution job panicked");
            }
        }
    }

    while let Some(done) = jobs.join_next().await {
        if let Err(e) = done {
            error!(error = %e, "resolution job panicked");
        }
    }
    info!("resolution queue drained");
}

fn log_result(market: MarketId, result: &ResolutionResult) {
    if result.success {
        info!(
            market = %market,
            state = %result.state,
            outcome = ?result.outcome,
            tx = ?result.transaction_hash,
            reason = ?result.reason,
            "resolution complete"
        );
    } else if result.state == ResolutionState::AwaitingDispute {
        info!(market = %market, reason = ?result.reason, "resolution pending dispute window");
    } else {
        warn!(market = %market, reason = ?result.reason, "resolution failed");
    }
}
