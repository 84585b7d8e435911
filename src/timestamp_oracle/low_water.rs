use crate::hlc::timestamp::Timestamp;

/**
 * As explained in Matt Tracy's blog: https://www.cockroachlabs.com/blog/serializable-lockless-distributed-isolation-cockroachdb/,
 * the low water mark is maintained to deal with keys not in the cache.
 * Whenever information about a span is thrown away, the mark is raised to
 * that information's timestamp so every answer stays at or above it.
 */
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LowWaterMark {
    timestamp: Timestamp,
}

impl LowWaterMark {
    pub fn new() -> Self {
        LowWaterMark::default()
    }

    pub fn get(&self) -> Timestamp {
        self.timestamp
    }

    // Returns whether the mark moved.
    pub fn raise(&mut self, timestamp: Timestamp) -> bool {
        if timestamp > self.timestamp {
            self.timestamp = timestamp;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{hlc::timestamp::Timestamp, timestamp_oracle::low_water::LowWaterMark};

    #[test]
    fn starts_at_zero() {
        assert_eq!(LowWaterMark::new().get(), Timestamp::zero());
    }

    #[test]
    fn never_decreases() {
        let mut low_water = LowWaterMark::new();
        assert!(low_water.raise(Timestamp::new(10, 2)));
        assert!(!low_water.raise(Timestamp::new(10, 1)));
        assert!(!low_water.raise(Timestamp::new(10, 2)));
        assert_eq!(low_water.get(), Timestamp::new(10, 2));
        assert!(low_water.raise(Timestamp::new(11, 0)));
        assert_eq!(low_water.get(), Timestamp::new(11, 0));
    }
}
