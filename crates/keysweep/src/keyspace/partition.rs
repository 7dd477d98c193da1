use crate::{
    error::{Error, Result},
    protocol::WorkerId,
};
use serde::{Deserialize, Serialize};

/// A contiguous slice `[offset, offset + range)` of the keyspace owned by one
/// worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub worker: WorkerId,
    pub offset: u64,
    pub range: u64,
}

impl Assignment {
    /// One past the last index of this assignment.
    pub const fn end(&self) -> u64 {
        self.offset + self.range
    }

    pub const fn contains(&self, index: u64) -> bool {
        index >= self.offset && index < self.end()
    }
}

/// Splits `[0, size)` into `workers` contiguous, ordered assignments.
///
/// Every worker gets `base = size / workers` indices. The remainder
/// `size mod workers` goes entirely to the last worker rather than being
/// spread around, so for 100 candidates over 3 workers the ranges are 33, 33
/// and 34. Worker ids start at 1.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if `workers` is zero, or if there are
/// fewer candidates than workers (some worker would get an empty range).
pub fn partition(size: u64, workers: usize) -> Result<Vec<Assignment>> {
    if workers == 0 {
        return Err(Error::invalid_config("worker count must be at least 1"));
    }

    let count = workers as u64;
    let base = size / count;
    if base == 0 {
        return Err(Error::invalid_config(format!(
            "{workers} workers cannot split a keyspace of {size} candidates"
        )));
    }

    let mut assignments: Vec<Assignment> = (0..workers)
        .map(|k| Assignment {
            worker: WorkerId::from_index(k),
            offset: k as u64 * base,
            range: base,
        })
        .collect();

    if let Some(last) = assignments.last_mut() {
        last.range += size % count;
    }

    Ok(assignments)
}
