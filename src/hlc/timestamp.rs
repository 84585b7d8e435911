use std::fmt;

use serde::{Deserialize, Serialize};

/**
 * Hybrid logical clock timestamp. Ordered by wall_time first and logical_time
 * second, which is exactly the derived lexicographic order of the fields.
 */
#[derive(
    Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub wall_time: u64,
    pub logical_time: u32,
}

impl Timestamp {
    pub fn new(wall_time: u64, logical_time: u32) -> Self {
        Timestamp {
            wall_time,
            logical_time,
        }
    }

    pub fn zero() -> Self {
        Timestamp::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Timestamp::zero()
    }

    // Smallest timestamp strictly greater than self
    pub fn next(&self) -> Timestamp {
        match self.logical_time.checked_add(1) {
            Some(logical_time) => Timestamp::new(self.wall_time, logical_time),
            None => Timestamp::new(self.wall_time.saturating_add(1), 0),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:010}", self.wall_time, self.logical_time)
    }
}
