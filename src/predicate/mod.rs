//! Predicate evaluation: pure functions over an observed value.

use crate::market::{MarketId, PredicateOp};
use alloy::primitives::{keccak256, B256, U256};
use rust_decimal::Decimal;
use std::fmt;

/// Binary market outcome as recorded on-chain (1 = YES, 0 = NO).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    No = 0,
    Yes = 1,
}

impl Outcome {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<bool> for Outcome {
    fn from(holds: bool) -> Self {
        if holds {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }
}

/// Which end of the window an extremum lookup should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumDirection {
    Max,
    Min,
}

impl ExtremumDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtremumDirection::Max => "max",
            ExtremumDirection::Min => "min",
        }
    }
}

impl fmt::Display for ExtremumDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `value <op> threshold`, both fixed-point at the market's decimals.
pub fn evaluate(value: i128, threshold: i128, op: PredicateOp) -> Outcome {
    let holds = match op {
        PredicateOp::Gt => value > threshold,
        PredicateOp::Gte => value >= threshold,
        PredicateOp::Lt => value < threshold,
        PredicateOp::Lte => value <= threshold,
        PredicateOp::Eq => value == threshold,
        PredicateOp::Neq => value != threshold,
    };
    Outcome::from(holds)
}

/// Direction of the extremum a question is asking about.
///
/// "Did it ever go above X" needs the window max; "did it ever go below X"
/// needs the min. Equality questions have no natural direction and look at
/// the max.
pub fn extremum_direction(op: PredicateOp) -> ExtremumDirection {
    match op {
        PredicateOp::Gt | PredicateOp::Gte => ExtremumDirection::Max,
        PredicateOp::Lt | PredicateOp::Lte => ExtremumDirection::Min,
        PredicateOp::Eq | PredicateOp::Neq => ExtremumDirection::Max,
    }
}

/// Evidence fingerprint committed alongside the outcome.
///
/// keccak256 over the packed encoding `int256 value ++ address market ++
/// uint256 timestamp`. The timestamp is the attempt time, so re-running an
/// evaluation produces a different hash for the same value.
pub fn compute_audit_hash(value: i128, market: MarketId, timestamp: u64) -> B256 {
    // sign-extend to a 256-bit two's complement word
    let mut value_word = if value < 0 { [0xffu8; 32] } else { [0u8; 32] };
    value_word[16..].copy_from_slice(&value.to_be_bytes());

    let mut packed = Vec::with_capacity(32 + 20 + 32);
    packed.extend_from_slice(&value_word);
    packed.extend_from_slice(market.as_slice());
    packed.extend_from_slice(&U256::from(timestamp).to_be_bytes::<32>());
    keccak256(&packed)
}

/// Scale a decimal reading to fixed-point at `decimals`, truncating the rest.
///
/// Works on the raw mantissa so the result can use the full i128 range,
/// not just the 96 bits a `Decimal` can hold.
pub fn to_fixed_point(value: Decimal, decimals: u32) -> Option<i128> {
    let mantissa = value.mantissa();
    let scale = value.scale();
    if decimals >= scale {
        mantissa.checked_mul(10i128.checked_pow(decimals - scale)?)
    } else {
        // integer division truncates toward zero
        Some(mantissa / 10i128.checked_pow(scale - decimals)?)
    }
}
