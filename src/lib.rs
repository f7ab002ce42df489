//! Market resolution service.
//!
//! Change events arrive over a signed webhook, eligible markets go onto a
//! deduplicating queue, and each job walks the market through the oracle's
//! commit / dispute / finalize cycle using values read from the data source.

pub mod chain;
pub mod clock;
pub mod config;
pub mod datasource;
pub mod market;
pub mod predicate;
pub mod queue;
pub mod resolution;
pub mod webhook;

#[cfg(test)]
mod testing;
