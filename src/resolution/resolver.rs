use crate::chain::{ChainError, ChainGateway, PendingResolution};
use crate::clock::Clock;
use crate::config::ResolverConfig;
use crate::datasource::DataSource;
use crate::market::{Market, MarketId, Predicate, WindowKind};
use crate::predicate::{compute_audit_hash, evaluate, extremum_direction, to_fixed_point, Outcome};
use crate::resolution::{ResolutionResult, ResolutionState, ResolveError, MAX_RETRIES_REASON};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a single attempt decided and did.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Committed { outcome: Outcome, tx: String },
    Waiting { outcome: u8, finalizable_at: u64 },
    Finalized { outcome: u8, tx: String },
    AlreadyResolved,
    AlreadyCancelled,
    NotYetResolvable { resolve_time: u64 },
    Unconfirmed { state: ResolutionState, tx: String },
}

impl Step {
    fn into_result(self) -> ResolutionResult {
        match self {
            Step::Committed { outcome, tx } => ResolutionResult::committed(outcome, tx),
            Step::Waiting {
                outcome,
                finalizable_at,
            } => ResolutionResult::waiting(outcome, finalizable_at),
            Step::Finalized { outcome, tx } => ResolutionResult::finalized(outcome, tx),
            Step::AlreadyResolved => {
                ResolutionResult::settled(ResolutionState::Finalized, "market already resolved")
            }
            Step::AlreadyCancelled => {
                ResolutionResult::settled(ResolutionState::Cancelled, "market cancelled")
            }
            Step::Unconfirmed { state, tx } => ResolutionResult::unconfirmed(state, tx),
            Step::NotYetResolvable { resolve_time } => ResolutionResult::failed(format!(
                "market not yet resolvable, resolve time {}",
                resolve_time
            )),
        }
    }
}

/// Drives one market through commit / dispute / finalize.
pub struct Resolver {
    chain: Arc<dyn ChainGateway>,
    data: Arc<dyn DataSource>,
    clock: Arc<dyn Clock>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl Resolver {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        data: Arc<dyn DataSource>,
        clock: Arc<dyn Clock>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            chain,
            data,
            clock,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Run the state machine for `market` until it reaches a decision or
    /// runs out of attempts. Never panics or errors; the result says how it went.
    pub async fn resolve(&self, market: MarketId) -> ResolutionResult {
        for attempt in 1..=self.retry_attempts {
            match self.step(market).await {
                Ok(step) => {
                    debug!(market = %market, attempt, step = ?step, "resolution step");
                    return step.into_result();
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        market = %market,
                        attempt,
                        max_attempts = self.retry_attempts,
                        error = %e,
                        "resolution attempt failed"
                    );
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    error!(market = %market, error = %e, "resolution failed permanently");
                    return ResolutionResult::failed(e.to_string());
                }
            }
        }

        ResolutionResult::failed(MAX_RETRIES_REASON)
    }

    /// One pass over chain state. Re-derives everything, so it is safe to
    /// repeat after a partial failure.
    async fn step(&self, id: MarketId) -> Result<Step, ResolveError> {
        let market = self.chain.market(id).await?;
        if market.cancelled {
            return Ok(Step::AlreadyCancelled);
        }
        if market.resolved {
            return Ok(Step::AlreadyResolved);
        }

        let now = self.clock.now();
        if let Some(pending) = self.chain.pending_resolution(id).await? {
            return self.finalize_if_due(id, pending, now).await;
        }

        if now < market.resolve_time {
            return Ok(Step::NotYetResolvable {
                resolve_time: market.resolve_time,
            });
        }

        let predicate = market.predicate()?;
        let value = self.observe(&market, &predicate).await?;
        let outcome = evaluate(value, market.threshold, predicate.op);
        let data_hash = compute_audit_hash(value, id, now);

        info!(
            market = %id,
            value,
            op = %predicate.op,
            threshold = market.threshold,
            outcome = outcome.as_u8(),
            data_hash = %data_hash,
            "predicate evaluated, committing"
        );

        match self.chain.commit(id, outcome, data_hash).await {
            Ok(tx) => Ok(Step::Committed { outcome, tx }),
            Err(ChainError::Unconfirmed { tx }) => {
                warn!(market = %id, tx = %tx, "commit sent but unconfirmed, not resending");
                Ok(Step::Unconfirmed {
                    state: ResolutionState::CommitSubmitted,
                    tx,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submit finalize only once the dispute window has fully elapsed.
    async fn finalize_if_due(
        &self,
        id: MarketId,
        pending: PendingResolution,
        now: u64,
    ) -> Result<Step, ResolveError> {
        let window = self.chain.dispute_window_seconds().await?;
        let finalizable_at = pending.finalizable_at(window);

        if now < finalizable_at {
            info!(
                market = %id,
                remaining_secs = finalizable_at - now,
                "dispute window open, waiting"
            );
            return Ok(Step::Waiting {
                outcome: pending.outcome,
                finalizable_at,
            });
        }

        match self.chain.finalize(id).await {
            Ok(tx) => Ok(Step::Finalized {
                outcome: pending.outcome,
                tx,
            }),
            Err(ChainError::Unconfirmed { tx }) => {
                warn!(market = %id, tx = %tx, "finalize sent but unconfirmed, not resending");
                Ok(Step::Unconfirmed {
                    state: ResolutionState::Finalized,
                    tx,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the authoritative value for the market's window, in fixed-point.
    async fn observe(&self, market: &Market, predicate: &Predicate) -> Result<i128, ResolveError> {
        let subject = &predicate.subject;
        let reading = match predicate.window {
            WindowKind::SnapshotAt => self.data.snapshot_value(subject, market.window_end).await?,
            WindowKind::TimeAverage => {
                self.data
                    .time_average_value(subject, market.window_start, market.window_end)
                    .await?
            }
            WindowKind::Extremum => {
                let direction = extremum_direction(predicate.op);
                self.data
                    .extremum_value(subject, market.window_start, market.window_end, direction)
                    .await?
            }
        };

        to_fixed_point(reading, market.value_decimals).ok_or(ResolveError::ValueOutOfRange {
            decimals: market.value_decimals,
        })
    }
}
