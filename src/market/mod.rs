//! Market model as delivered by the indexer and read back from chain.
//!
//! The resolver never owns markets; it only reads them. Kind fields arrive
//! either as the on-chain enum ordinal or as the enum name, and are kept as
//! a raw [`KindTag`] until the state machine asks for a typed [`Predicate`].
//! That way an unknown kind surfaces as a configuration failure on the job
//! rather than as a dropped webhook.

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Markets are identified by their contract address.
pub type MarketId = Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("unknown {axis}: {tag}")]
    UnknownKind { axis: &'static str, tag: String },
}

/// What is being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Metric,
    TokenPrice,
    Generic,
}

/// How the measured series is reduced to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    SnapshotAt,
    TimeAverage,
    Extremum,
}

/// Comparison applied between the observed value and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// Closed set of kinds decodable from an ordinal or a name.
trait Kind: Sized {
    const AXIS: &'static str;
    fn from_code(code: u8) -> Option<Self>;
    fn from_name(name: &str) -> Option<Self>;
}

impl Kind for SubjectKind {
    const AXIS: &'static str = "subjectKind";

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Metric),
            1 => Some(Self::TokenPrice),
            2 => Some(Self::Generic),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "METRIC" => Some(Self::Metric),
            "TOKEN_PRICE" => Some(Self::TokenPrice),
            "GENERIC" => Some(Self::Generic),
            _ => None,
        }
    }
}

impl Kind for WindowKind {
    const AXIS: &'static str = "windowKind";

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::SnapshotAt),
            1 => Some(Self::TimeAverage),
            2 => Some(Self::Extremum),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "SNAPSHOT_AT" => Some(Self::SnapshotAt),
            "TIME_AVERAGE" => Some(Self::TimeAverage),
            "EXTREMUM" => Some(Self::Extremum),
            _ => None,
        }
    }
}

impl Kind for PredicateOp {
    const AXIS: &'static str = "predicateOp";

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Gt),
            1 => Some(Self::Gte),
            2 => Some(Self::Lt),
            3 => Some(Self::Lte),
            4 => Some(Self::Eq),
            5 => Some(Self::Neq),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "GT" => Some(Self::Gt),
            "GTE" => Some(Self::Gte),
            "LT" => Some(Self::Lt),
            "LTE" => Some(Self::Lte),
            "EQ" => Some(Self::Eq),
            "NEQ" => Some(Self::Neq),
            _ => None,
        }
    }
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateOp::Gt => write!(f, ">"),
            PredicateOp::Gte => write!(f, ">="),
            PredicateOp::Lt => write!(f, "<"),
            PredicateOp::Lte => write!(f, "<="),
            PredicateOp::Eq => write!(f, "=="),
            PredicateOp::Neq => write!(f, "!="),
        }
    }
}

/// Raw kind field: enum ordinal from chain, or enum name from the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum KindTag {
    Code(u8),
    Name(String),
}

impl KindTag {
    fn parse<K: Kind>(&self) -> Result<K, MarketError> {
        let parsed = match self {
            KindTag::Code(code) => K::from_code(*code),
            KindTag::Name(name) => name
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(K::from_code)
                .or_else(|| K::from_name(&name.trim().to_ascii_uppercase())),
        };
        parsed.ok_or_else(|| MarketError::UnknownKind {
            axis: K::AXIS,
            tag: self.to_string(),
        })
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindTag::Code(code) => write!(f, "{}", code),
            KindTag::Name(name) => write!(f, "{}", name),
        }
    }
}

/// The thing the data source is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub kind: SubjectKind,
    /// Metric key, token address, or generic feed id.
    pub id: String,
}

/// Typed view over a market's kind fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub subject: Subject,
    pub window: WindowKind,
    pub op: PredicateOp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    #[serde(deserialize_with = "de_address")]
    pub id: MarketId,
    pub subject_kind: KindTag,
    pub window_kind: KindTag,
    pub predicate_op: KindTag,
    #[serde(default)]
    pub subject_id: String,
    /// Fixed-point at `value_decimals`.
    #[serde(deserialize_with = "de_number")]
    pub threshold: i128,
    #[serde(default, deserialize_with = "de_number")]
    pub value_decimals: u32,
    #[serde(deserialize_with = "de_number")]
    pub window_start: u64,
    #[serde(deserialize_with = "de_number")]
    pub window_end: u64,
    #[serde(deserialize_with = "de_number")]
    pub resolve_time: u64,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, deserialize_with = "de_number")]
    pub pool_yes: u128,
    #[serde(default, deserialize_with = "de_number")]
    pub pool_no: u128,
}

impl Market {
    /// Unresolved, not cancelled, past its resolve time, and has seen activity.
    pub fn is_eligible(&self, now: u64) -> bool {
        !self.resolved
            && !self.cancelled
            && now >= self.resolve_time
            && (self.pool_yes > 0 || self.pool_no > 0)
    }

    pub fn predicate(&self) -> Result<Predicate, MarketError> {
        Ok(Predicate {
            subject: Subject {
                kind: self.subject_kind.parse()?,
                id: self.subject_id.clone(),
            },
            window: self.window_kind.parse()?,
            op: self.predicate_op.parse()?,
        })
    }
}

fn de_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Address::from_str(raw.trim()).map_err(serde::de::Error::custom)
}

/// Indexers emit big integers as strings; accept either form.
fn de_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(serde_json::Number),
        Str(String),
    }

    let raw = match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => n.to_string(),
        NumOrStr::Str(s) => s.trim().to_string(),
    };
    raw.parse::<T>().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market_json() -> serde_json::Value {
        json!({
            "id": "0x00000000000000000000000000000000000000aa",
            "subjectKind": "TOKEN_PRICE",
            "windowKind": 2,
            "predicateOp": "GT",
            "subjectId": "0xtoken",
            "threshold": "100",
            "valueDecimals": 0,
            "windowStart": "1000",
            "windowEnd": 2000,
            "resolveTime": "2000",
            "resolved": false,
            "cancelled": false,
            "poolYes": "100",
            "poolNo": "0"
        })
    }

    fn market() -> Market {
        serde_json::from_value(market_json()).unwrap()
    }

    #[test]
    fn test_decodes_indexer_payload() {
        let m = market();
        assert_eq!(m.threshold, 100);
        assert_eq!(m.window_end, 2000);
        assert_eq!(m.pool_yes, 100);

        let p = m.predicate().unwrap();
        assert_eq!(p.subject.kind, SubjectKind::TokenPrice);
        assert_eq!(p.subject.id, "0xtoken");
        assert_eq!(p.window, WindowKind::Extremum);
        assert_eq!(p.op, PredicateOp::Gt);
    }

    #[test]
    fn test_negative_threshold() {
        let mut raw = market_json();
        raw["threshold"] = json!("-250000");
        let m: Market = serde_json::from_value(raw).unwrap();
        assert_eq!(m.threshold, -250_000);
    }

    #[test]
    fn test_eligible_with_activity_after_resolve_time() {
        // poolYes=100, poolNo=0, resolve time in the past
        assert!(market().is_eligible(2500));
    }

    #[test]
    fn test_not_eligible_before_resolve_time() {
        assert!(!market().is_eligible(1999));
    }

    #[test]
    fn test_not_eligible_when_settled_or_idle() {
        let mut m = market();
        m.resolved = true;
        assert!(!m.is_eligible(2500));

        let mut m = market();
        m.cancelled = true;
        assert!(!m.is_eligible(2500));

        let mut m = market();
        m.pool_yes = 0;
        assert!(!m.is_eligible(2500));
    }

    #[test]
    fn test_unknown_kind_is_reported() {
        let mut m = market();
        m.predicate_op = KindTag::Name("BETWEEN".to_string());
        assert_eq!(
            m.predicate(),
            Err(MarketError::UnknownKind {
                axis: "predicateOp",
                tag: "BETWEEN".to_string()
            })
        );

        m.predicate_op = KindTag::Code(1);
        m.window_kind = KindTag::Code(9);
        assert!(matches!(
            m.predicate(),
            Err(MarketError::UnknownKind { axis: "windowKind", .. })
        ));
    }

    #[test]
    fn test_numeric_string_kind_tag() {
        let mut m = market();
        m.subject_kind = KindTag::Name("0".to_string());
        assert_eq!(m.predicate().unwrap().subject.kind, SubjectKind::Metric);
    }
}
