use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    hlc::timestamp::Timestamp,
    interval::interval_cache::IntervalCache,
    span::Span,
    timestamp_oracle::{
        config::{MatchPolicy, TsCacheConfig},
        low_water::LowWaterMark,
        pending_log::PendingLog,
        request::{Request, RequestKey},
    },
    TsCacheResult,
};

pub use crate::timestamp_oracle::request::SpanKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OracleStats {
    pub pending_requests: usize,
    pub pending_bytes: u64,
    pub read: CacheStats,
    pub write: CacheStats,
    pub txn: CacheStats,
    pub low_water: Timestamp,
}

// Inspired by CockroachDB's https://github.com/cockroachdb/cockroach/blob/master/pkg/kv/kvserver/tscache/cache.go#L31
// which corresponds to the oracle described in Yabandeh's A Critique of Snapshot Isolation
pub struct TimestampOracle {
    config: TsCacheConfig,
    state: RwLock<OracleState>,
}

#[derive(Default)]
struct OracleState {
    pending: PendingLog,
    caches: [IntervalCache; 3],
    low_water: LowWaterMark,
    next_sequence: u64,
}

impl Default for TimestampOracle {
    fn default() -> Self {
        TimestampOracle::with_validated_config(TsCacheConfig::default())
    }
}

impl TimestampOracle {
    pub fn new(config: TsCacheConfig) -> TsCacheResult<Self> {
        config.validate()?;
        Ok(TimestampOracle::with_validated_config(config))
    }

    fn with_validated_config(config: TsCacheConfig) -> Self {
        TimestampOracle {
            config,
            state: RwLock::new(OracleState::default()),
        }
    }

    pub fn config(&self) -> &TsCacheConfig {
        &self.config
    }

    /**
     * Records the spans a batch read and wrote at its timestamp. The request
     * is only staged here; it gets indexed by span once a query needs it or
     * the pending log runs over budget.
     */
    pub fn add(&self, request: Request) {
        let mut state = self.write_state();
        state.add(request, &self.config);
    }

    /**
     * Returns the max timestamp at which any key in the span was accessed by
     * a request of the given kind, ignoring requests of exclude_txn. If the
     * max timestamp belongs to a single transaction, the transaction id is
     * returned. Otherwise, if the max is shared by multiple transactions, or
     * only the low water mark is known, no transaction id is returned.
     *
     * The result is never below the low water mark and never below the
     * timestamp of a matching request that was added. It may be above.
     */
    pub fn get_max(
        &self,
        span: &Span,
        kind: SpanKind,
        exclude_txn: Option<Uuid>,
    ) -> (Timestamp, Option<Uuid>) {
        if self.config.expand_on_query {
            let mut state = self.write_state();
            let expanded = state.expand_overlapping(span, &self.config);
            if expanded > 0 {
                trace!(expanded, query = %span, "expanded pending requests for query");
            }
            state.max_in_caches(span, kind, exclude_txn)
        } else {
            let state = self.read_state();
            state.max_with_pending(span, kind, exclude_txn, self.config.match_policy)
        }
    }

    pub fn low_water(&self) -> Timestamp {
        self.read_state().low_water.get()
    }

    /**
     * Forgets everything the oracle knows. The low water mark is raised to
     * low_water first (it never goes down), so every later answer is at
     * least that.
     */
    pub fn clear(&self, low_water: Timestamp) {
        let mut state = self.write_state();
        state.low_water.raise(low_water);
        state.pending.clear();
        for cache in state.caches.iter_mut() {
            cache.clear();
        }
        debug!(low_water = %state.low_water.get(), "cleared timestamp oracle");
    }

    // Expands every pending request into the interval caches.
    pub fn expand_pending(&self) {
        let mut state = self.write_state();
        let mut expanded = 0;
        while let Some(request) = state.pending.pop_oldest() {
            state.expand(&request);
            expanded += 1;
        }
        state.evict(&self.config);
        debug!(expanded, "expanded all pending requests");
    }

    pub fn stats(&self) -> OracleStats {
        let state = self.read_state();
        let cache_stats = |kind: SpanKind| {
            let cache = state.cache(kind);
            CacheStats {
                entries: cache.len(),
                bytes: cache.size_bytes(),
            }
        };
        OracleStats {
            pending_requests: state.pending.len(),
            pending_bytes: state.pending.size_bytes(),
            read: cache_stats(SpanKind::Read),
            write: cache_stats(SpanKind::Write),
            txn: cache_stats(SpanKind::Txn),
            low_water: state.low_water.get(),
        }
    }

    // Every mutation leaves the state consistent, so a panic while holding
    // the lock does not invalidate it.
    fn read_state(&self) -> RwLockReadGuard<'_, OracleState> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!("timestamp oracle lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, OracleState> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!("timestamp oracle lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl OracleState {
    fn cache(&self, kind: SpanKind) -> &IntervalCache {
        &self.caches[kind.index()]
    }

    fn add(&mut self, mut request: Request, config: &TsCacheConfig) {
        self.next_sequence += 1;
        request.set_sequence(self.next_sequence);

        if request.num_spans() == 0 {
            return;
        }
        // The low water mark already answers at least this timestamp for
        // every key.
        if request.timestamp() <= self.low_water.get() {
            trace!(
                timestamp = %request.timestamp(),
                low_water = %self.low_water.get(),
                "dropping request at or below low water mark"
            );
            return;
        }
        if request.estimated_size() > config.pending_log_byte_budget {
            warn!(
                size = request.estimated_size(),
                budget = config.pending_log_byte_budget,
                "request exceeds the pending log budget on its own"
            );
        }

        self.pending.insert(request);
        if self.pending.size_bytes() > config.pending_log_byte_budget {
            self.shrink_pending(config);
        }
    }

    // Force-expands the oldest pending requests until the log is back under
    // budget.
    fn shrink_pending(&mut self, config: &TsCacheConfig) {
        let bytes_before = self.pending.size_bytes();
        let mut expanded = 0;
        while self.pending.size_bytes() > config.pending_log_byte_budget {
            let Some(request) = self.pending.pop_oldest() else {
                break;
            };
            self.expand(&request);
            expanded += 1;
        }
        debug!(
            expanded,
            bytes_before,
            bytes_after = self.pending.size_bytes(),
            "pending log over budget, expanded oldest requests"
        );
        self.evict(config);
    }

    fn expand(&mut self, request: &Request) {
        for kind in SpanKind::ALL {
            let cache = &mut self.caches[kind.index()];
            for span in request.spans(kind) {
                cache.insert(span, request.timestamp(), request.txn_id());
            }
        }
    }

    // Expands the pending requests that may overlap the span. Returns how
    // many were expanded.
    fn expand_overlapping(&mut self, span: &Span, config: &TsCacheConfig) -> usize {
        let probe = RequestKey::probe(self.low_water.get().next());
        let keys: Vec<RequestKey> = self
            .pending
            .range_from(probe)
            .filter(|request| {
                request
                    .overall_span()
                    .map_or(false, |overall| overall.overlaps(span))
            })
            .map(Request::key)
            .collect();
        for key in keys.iter() {
            if let Some(request) = self.pending.remove(key) {
                self.expand(&request);
            }
        }
        if !keys.is_empty() {
            self.evict(config);
        }
        keys.len()
    }

    /**
     * Evicts every interval cache down to its budget, then drops the pending
     * requests the raised low water mark now covers.
     */
    fn evict(&mut self, config: &TsCacheConfig) {
        for kind in SpanKind::ALL {
            let budget = config.interval_cache_byte_budget.get(kind);
            let evicted = self.caches[kind.index()].evict_to(budget, &mut self.low_water);
            if evicted > 0 {
                debug!(
                    %kind,
                    evicted,
                    low_water = %self.low_water.get(),
                    "interval cache over budget, evicted oldest entries"
                );
            }
        }
        let discarded = self.pending.discard_through(self.low_water.get());
        if discarded > 0 {
            debug!(
                discarded,
                low_water = %self.low_water.get(),
                "discarded pending requests below low water mark"
            );
        }
    }

    fn max_in_caches(
        &self,
        span: &Span,
        kind: SpanKind,
        exclude_txn: Option<Uuid>,
    ) -> (Timestamp, Option<Uuid>) {
        let floor = self.low_water.get();
        match self.cache(kind).max_overlap(span, exclude_txn) {
            Some((timestamp, txn_id)) if timestamp > floor => (timestamp, txn_id),
            _ => (floor, None),
        }
    }

    fn max_with_pending(
        &self,
        span: &Span,
        kind: SpanKind,
        exclude_txn: Option<Uuid>,
        policy: MatchPolicy,
    ) -> (Timestamp, Option<Uuid>) {
        let mut max = self.max_in_caches(span, kind, exclude_txn);

        // Requests at or below the floor cannot raise the answer.
        let probe = RequestKey::probe(self.low_water.get().next());
        let mut pending_max: Option<(Timestamp, Option<Uuid>)> = None;
        for request in self.pending.range_from(probe) {
            if !pending_matches(request, span, kind, exclude_txn, policy) {
                continue;
            }
            pending_max = match pending_max {
                Some((timestamp, txn_id)) if timestamp > request.timestamp() => {
                    Some((timestamp, txn_id))
                }
                Some((timestamp, txn_id)) if timestamp == request.timestamp() => {
                    if txn_id == request.txn_id() {
                        Some((timestamp, txn_id))
                    } else {
                        Some((timestamp, None))
                    }
                }
                _ => Some((request.timestamp(), request.txn_id())),
            };
        }

        // Ties go to the interval cache.
        if let Some((timestamp, txn_id)) = pending_max {
            if timestamp > max.0 {
                max = (timestamp, txn_id);
            }
        }
        max
    }
}

fn pending_matches(
    request: &Request,
    span: &Span,
    kind: SpanKind,
    exclude_txn: Option<Uuid>,
    policy: MatchPolicy,
) -> bool {
    let Some(overall) = request.overall_span() else {
        return false;
    };
    if !overall.overlaps(span) {
        return false;
    }
    let spans = request.spans(kind);
    if spans.is_empty() {
        return false;
    }
    if exclude_txn.is_some() && request.txn_id() == exclude_txn {
        return false;
    }
    match policy {
        MatchPolicy::Coarse => true,
        MatchPolicy::Precise => spans.iter().any(|s| s.overlaps(span)),
    }
}
