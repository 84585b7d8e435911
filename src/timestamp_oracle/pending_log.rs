use std::{collections::BTreeMap, mem};

use crate::{
    hlc::timestamp::Timestamp,
    timestamp_oracle::request::{Request, RequestKey},
};

/**
 * Requests that have not been expanded into the interval caches yet, kept
 * in timestamp order. Staging a request is a single btree insert no matter
 * how many spans it touches.
 */
#[derive(Debug, Default)]
pub struct PendingLog {
    requests: BTreeMap<RequestKey, Request>,
    size_bytes: u64,
}

impl PendingLog {
    pub fn new() -> Self {
        PendingLog::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    // Sum of estimated_size() over the staged requests.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn insert(&mut self, request: Request) {
        self.size_bytes += request.estimated_size();
        if let Some(replaced) = self.requests.insert(request.key(), request) {
            self.size_bytes -= replaced.estimated_size();
        }
    }

    // Iterates requests in ascending order, starting at the probe.
    pub fn range_from(&self, probe: RequestKey) -> impl Iterator<Item = &Request> {
        self.requests.range(probe..).map(|(_, request)| request)
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<Request> {
        let request = self.requests.remove(key)?;
        self.size_bytes -= request.estimated_size();
        Some(request)
    }

    pub fn pop_oldest(&mut self) -> Option<Request> {
        let (_, request) = self.requests.pop_first()?;
        self.size_bytes -= request.estimated_size();
        Some(request)
    }

    /**
     * Drops every request with a timestamp at or below the given timestamp,
     * returning how many were dropped. Callers must only do this once the
     * low water mark covers the timestamp.
     */
    pub fn discard_through(&mut self, timestamp: Timestamp) -> usize {
        let kept = self
            .requests
            .split_off(&RequestKey::probe(timestamp.next()));
        let discarded = mem::replace(&mut self.requests, kept);
        let discarded_bytes: u64 = discarded.values().map(Request::estimated_size).sum();
        self.size_bytes -= discarded_bytes;
        discarded.len()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.size_bytes = 0;
    }
}
