//! Wall-clock source, in unix seconds.

/// Source of "now" for eligibility and dispute-window checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}
