pub mod hlc;
pub mod interval;
pub mod llrb;
pub mod span;
pub mod timestamp_oracle;

#[cfg(test)]
mod helpers;

use thiserror::Error;

use crate::span::Key;

pub use crate::hlc::timestamp::Timestamp;
pub use crate::span::Span;
pub use crate::timestamp_oracle::{
    config::{MatchPolicy, PerKindBudget, TsCacheConfig},
    oracle::{OracleStats, SpanKind, TimestampOracle},
    request::Request,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TsCacheError {
    #[error("invalid span: end key {end_key:?} does not sort after start key {key:?}")]
    InvalidSpan { key: Key, end_key: Key },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type TsCacheResult<T> = Result<T, TsCacheError>;
