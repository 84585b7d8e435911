use std::{fmt, slice};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    hlc::timestamp::Timestamp,
    interval::interval_cache::cache_entry_size,
    span::{Key, Span},
};

/**
 * Which of a request's spans a query is interested in. Each kind has its
 * own interval cache.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanKind {
    Read,
    Write,
    // the key of the transaction record
    Txn,
}

impl SpanKind {
    pub const ALL: [SpanKind; 3] = [SpanKind::Read, SpanKind::Write, SpanKind::Txn];

    pub fn index(self) -> usize {
        match self {
            SpanKind::Read => 0,
            SpanKind::Write => 1,
            SpanKind::Txn => 2,
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanKind::Read => write!(f, "read"),
            SpanKind::Write => write!(f, "write"),
            SpanKind::Txn => write!(f, "txn"),
        }
    }
}

/**
 * Position of a request in the pending log. Requests are ordered by
 * timestamp, with the sequence breaking ties so any number of requests can
 * share a timestamp.
 *
 * Real requests have a sequence > 0. Probe keys used to seek into the log
 * carry sequence 0 so they sort before every request with the same
 * timestamp.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey {
    pub timestamp: Timestamp,
    pub sequence: u64,
}

impl RequestKey {
    pub fn probe(timestamp: Timestamp) -> Self {
        RequestKey {
            timestamp,
            sequence: 0,
        }
    }
}

/**
 * The timestamp cache data from a single batch request. Requests are staged
 * in the pending log and only "expanded" into the interval caches when a
 * query could be affected by them or when the log runs over budget.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    overall_span: Option<Span>,
    reads: Vec<Span>,
    writes: Vec<Span>,
    txn_span: Option<Span>,
    txn_id: Option<Uuid>,
    timestamp: Timestamp,
    sequence: u64,
    estimated_size: u64,
}

impl Request {
    pub fn builder(timestamp: Timestamp) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                overall_span: None,
                reads: Vec::new(),
                writes: Vec::new(),
                txn_span: None,
                txn_id: None,
                timestamp,
                sequence: 0,
                estimated_size: 0,
            },
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }

    // Bounding span of everything the request touches. None if it touches
    // nothing.
    pub fn overall_span(&self) -> Option<&Span> {
        self.overall_span.as_ref()
    }

    pub fn reads(&self) -> &[Span] {
        &self.reads
    }

    pub fn writes(&self) -> &[Span] {
        &self.writes
    }

    pub fn txn_span(&self) -> Option<&Span> {
        self.txn_span.as_ref()
    }

    pub fn txn_id(&self) -> Option<Uuid> {
        self.txn_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn spans(&self, kind: SpanKind) -> &[Span] {
        match kind {
            SpanKind::Read => &self.reads,
            SpanKind::Write => &self.writes,
            SpanKind::Txn => match &self.txn_span {
                Some(span) => slice::from_ref(span),
                None => &[],
            },
        }
    }

    // Number of interval cache entries the request expands into.
    pub fn num_spans(&self) -> usize {
        let mut n = self.reads.len() + self.writes.len();
        if self.txn_span.is_some() {
            n += 1;
        }
        n
    }

    /**
     * Estimate of the bytes the request occupies once expanded. Only used
     * for capacity accounting. Computed once when the request is built so
     * staging a request stays independent of its number of spans.
     */
    pub fn estimated_size(&self) -> u64 {
        self.estimated_size
    }
}

pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn txn_id(mut self, txn_id: Option<Uuid>) -> Self {
        self.request.txn_id = txn_id;
        self
    }

    pub fn read(mut self, span: Span) -> Self {
        self.request.reads.push(span);
        self
    }

    pub fn reads(mut self, spans: impl IntoIterator<Item = Span>) -> Self {
        self.request.reads.extend(spans);
        self
    }

    pub fn write(mut self, span: Span) -> Self {
        self.request.writes.push(span);
        self
    }

    pub fn writes(mut self, spans: impl IntoIterator<Item = Span>) -> Self {
        self.request.writes.extend(spans);
        self
    }

    // Key of the transaction record the batch touched.
    pub fn txn_record(mut self, key: impl Into<Key>) -> Self {
        self.request.txn_span = Some(Span::single(key));
        self
    }

    pub fn build(mut self) -> Request {
        let request = &self.request;
        let overall_span = request
            .reads
            .iter()
            .chain(request.writes.iter())
            .chain(request.txn_span.iter())
            .fold(None, |bound: Option<Span>, span| match bound {
                Some(bound) => Some(bound.bounding(span)),
                None => Some(span.clone()),
            });
        let estimated_size: u64 = SpanKind::ALL
            .iter()
            .flat_map(|kind| request.spans(*kind))
            .map(cache_entry_size)
            .sum();
        self.request.overall_span = overall_span;
        self.request.estimated_size = estimated_size;
        self.request
    }
}
