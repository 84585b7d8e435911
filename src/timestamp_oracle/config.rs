use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{timestamp_oracle::request::SpanKind, TsCacheError, TsCacheResult};

const MIB: u64 = 1 << 20;

/**
 * How a query treats a pending request whose bounding span overlaps it.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Check every span of the queried kind against the query.
    #[default]
    Precise,
    /// Count any bounding span hit as a match. Never under-reports, but may
    /// report a timestamp for keys the request did not touch.
    Coarse,
}

/// Byte budget of each interval cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerKindBudget {
    pub read: u64,
    pub write: u64,
    pub txn: u64,
}

impl PerKindBudget {
    pub fn uniform(bytes: u64) -> Self {
        PerKindBudget {
            read: bytes,
            write: bytes,
            txn: bytes,
        }
    }

    pub fn get(&self, kind: SpanKind) -> u64 {
        match kind {
            SpanKind::Read => self.read,
            SpanKind::Write => self.write,
            SpanKind::Txn => self.txn,
        }
    }
}

impl Default for PerKindBudget {
    fn default() -> Self {
        PerKindBudget {
            read: 64 * MIB,
            write: 64 * MIB,
            txn: 8 * MIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TsCacheConfig {
    /// Bytes of unexpanded requests to stage before force-expanding the
    /// oldest ones.
    pub pending_log_byte_budget: u64,
    pub interval_cache_byte_budget: PerKindBudget,
    pub match_policy: MatchPolicy,
    /// Expand pending requests into the interval caches once a query has
    /// looked at them, so later queries find them in the index.
    pub expand_on_query: bool,
}

impl Default for TsCacheConfig {
    fn default() -> Self {
        TsCacheConfig {
            pending_log_byte_budget: 4 * MIB,
            interval_cache_byte_budget: PerKindBudget::default(),
            match_policy: MatchPolicy::default(),
            expand_on_query: true,
        }
    }
}

impl TsCacheConfig {
    pub fn validate(&self) -> TsCacheResult<()> {
        if self.pending_log_byte_budget == 0 {
            return Err(TsCacheError::InvalidConfig(
                "pending_log_byte_budget must be greater than 0".to_owned(),
            ));
        }
        for kind in SpanKind::ALL {
            if self.interval_cache_byte_budget.get(kind) == 0 {
                return Err(TsCacheError::InvalidConfig(format!(
                    "interval_cache_byte_budget.{} must be greater than 0",
                    kind
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: TsCacheConfig =
            serde_json::from_str(json).context("failed to parse timestamp cache config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        TsCacheConfig::from_json_str(&json)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}
