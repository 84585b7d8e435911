use std::{borrow::Cow, cmp, fmt};

use crate::{TsCacheError, TsCacheResult};

pub type Key = Vec<u8>;

/**
 * A half-open key range [key, end_key). A span without an end_key covers
 * exactly one key, which behaves like the range [key, key\x00).
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Span {
    key: Key,
    end_key: Option<Key>,
}

impl Span {
    pub fn new(key: impl Into<Key>, end_key: Option<Key>) -> TsCacheResult<Self> {
        let key = key.into();
        if let Some(end) = &end_key {
            if *end <= key {
                return Err(TsCacheError::InvalidSpan {
                    key,
                    end_key: end.clone(),
                });
            }
        }
        Ok(Span { key, end_key })
    }

    pub fn single(key: impl Into<Key>) -> Self {
        Span {
            key: key.into(),
            end_key: None,
        }
    }

    pub fn range(key: impl Into<Key>, end_key: impl Into<Key>) -> TsCacheResult<Self> {
        Span::new(key, Some(end_key.into()))
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn end_key(&self) -> Option<&[u8]> {
        self.end_key.as_deref()
    }

    pub fn is_single_key(&self) -> bool {
        self.end_key.is_none()
    }

    // The first key past the span. For a single key k this is k\x00.
    pub fn exclusive_end(&self) -> Cow<'_, [u8]> {
        match &self.end_key {
            Some(end) => Cow::Borrowed(end.as_slice()),
            None => {
                let mut next = Vec::with_capacity(self.key.len() + 1);
                next.extend_from_slice(&self.key);
                next.push(0);
                Cow::Owned(next)
            }
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        match &self.end_key {
            Some(end) => self.key.as_slice() <= key && key < end.as_slice(),
            None => self.key.as_slice() == key,
        }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        match (&self.end_key, &other.end_key) {
            (None, None) => self.key == other.key,
            (None, Some(_)) => other.contains_key(&self.key),
            (Some(_), None) => self.contains_key(&other.key),
            (Some(end), Some(other_end)) => self.key < *other_end && other.key < *end,
        }
    }

    /**
     * Returns the smallest span covering both self and other. The result
     * may cover keys that neither input covers.
     */
    pub fn bounding(&self, other: &Span) -> Span {
        if self == other {
            return self.clone();
        }
        let key = cmp::min(&self.key, &other.key).clone();
        let end_key = cmp::max(self.exclusive_end(), other.exclusive_end()).into_owned();
        Span {
            key,
            end_key: Some(end_key),
        }
    }

    // Bytes of the start key plus the exclusive end key, i.e. what an
    // interval index stores for this span. Used for memory accounting.
    pub(crate) fn indexed_bytes(&self) -> usize {
        self.key.len() + self.end_key.as_ref().map_or(self.key.len() + 1, Vec::len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end_key {
            Some(end) => write!(
                f,
                "[{}, {})",
                String::from_utf8_lossy(&self.key),
                String::from_utf8_lossy(end)
            ),
            None => write!(f, "{}", String::from_utf8_lossy(&self.key)),
        }
    }
}
