use uuid::Uuid;

use crate::{
    hlc::timestamp::Timestamp,
    span::{Key, Span},
    timestamp_oracle::request::Request,
};

pub fn str_to_key(str: &str) -> Key {
    str.as_bytes().to_vec()
}

pub fn key_span(key: &str) -> Span {
    Span::single(str_to_key(key))
}

pub fn range_span(start: &str, end: &str) -> Span {
    Span::range(str_to_key(start), str_to_key(end)).unwrap()
}

pub fn ts(wall_time: u64) -> Timestamp {
    Timestamp::new(wall_time, 0)
}

pub fn write_request(span: Span, wall_time: u64, txn_id: Option<Uuid>) -> Request {
    Request::builder(ts(wall_time))
        .txn_id(txn_id)
        .write(span)
        .build()
}

pub fn read_request(span: Span, wall_time: u64, txn_id: Option<Uuid>) -> Request {
    Request::builder(ts(wall_time))
        .txn_id(txn_id)
        .read(span)
        .build()
}
