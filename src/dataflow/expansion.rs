//! Time-expansion policies.
//!
//! A time-expanded input turns successive single measurements into a list.
//! [`TimeAccumulator`] holds the entries; the [`TimePolicy`] decides what is
//! kept and when a list may be emitted:
//!
//! - [`TimePolicy::UntilConsumed`]: everything since the last successful
//!   computation;
//! - [`TimePolicy::Ring`]: the last `capacity` entries, only once full;
//! - [`TimePolicy::Window`]: entries newer than `t - width`;
//! - [`TimePolicy::Count`]: exactly `size` entries, emitted once and cleared.

use super::error::{DataflowError, DataflowResult};
use crate::measurement::{Measurement, Timestamp};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePolicy {
    UntilConsumed,
    Ring { capacity: usize },
    Window { width: Duration },
    Count { size: usize },
}

/// Entries of one time-expanded input, oldest first.
#[derive(Debug)]
pub struct TimeAccumulator<T> {
    policy: TimePolicy,
    entries: VecDeque<Measurement<T>>,
}

impl<T> TimeAccumulator<T> {
    pub fn new(policy: TimePolicy) -> Self {
        Self {
            policy,
            entries: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> TimePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, measurement: Measurement<T>) {
        let newest = measurement.time();
        self.entries.push_back(measurement);
        match self.policy {
            TimePolicy::Ring { capacity } => {
                while self.entries.len() > capacity {
                    self.entries.pop_front();
                }
            }
            TimePolicy::Window { width } => {
                let horizon = newest.as_nanos() as i128 - width.as_nanos() as i128;
                while self
                    .entries
                    .front()
                    .is_some_and(|m| (m.time().as_nanos() as i128) <= horizon)
                {
                    self.entries.pop_front();
                }
            }
            TimePolicy::Count { size } => {
                // a list that was never consumed restarts
                if self.entries.len() > size {
                    self.entries.drain(..self.entries.len() - 1);
                }
            }
            TimePolicy::UntilConsumed => {}
        }
    }

    /// The list available for a computation at time `t`.
    pub fn snapshot(&self, t: Timestamp) -> DataflowResult<Vec<Measurement<T>>> {
        match self.policy {
            TimePolicy::UntilConsumed => {
                if self.entries.is_empty() {
                    return Err(DataflowError::NoData("empty expansion list".to_string()));
                }
                Ok(self.entries.iter().cloned().collect())
            }
            TimePolicy::Ring { capacity } => {
                if self.entries.len() < capacity {
                    return Err(DataflowError::NotEnoughData(format!(
                        "ring buffer holds {} of {} measurements",
                        self.entries.len(),
                        capacity
                    )));
                }
                Ok(self.entries.iter().cloned().collect())
            }
            TimePolicy::Window { width } => {
                let horizon = t.as_nanos() as i128 - width.as_nanos() as i128;
                let selected: Vec<_> = self
                    .entries
                    .iter()
                    .filter(|m| m.time().as_nanos() as i128 > horizon)
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    return Err(DataflowError::NotEnoughData(
                        "no measurements within window".to_string(),
                    ));
                }
                Ok(selected)
            }
            TimePolicy::Count { size } => {
                if self.entries.len() < size {
                    return Err(DataflowError::NotEnoughData(format!(
                        "collected {} of {} measurements",
                        self.entries.len(),
                        size
                    )));
                }
                Ok(self.entries.iter().cloned().collect())
            }
        }
    }

    /// Called after a successful computation used the snapshot.
    pub fn consumed(&mut self) {
        match self.policy {
            TimePolicy::UntilConsumed | TimePolicy::Count { .. } => self.entries.clear(),
            TimePolicy::Ring { .. } | TimePolicy::Window { .. } => {}
        }
    }
}

/// Payloads of a snapshot, cloned out of their shared measurements.
pub fn payloads<T: Clone>(list: &[Measurement<T>]) -> DataflowResult<Vec<T>> {
    list.iter().map(|m| m.value().cloned()).collect()
}

/// Correspondent lists must have equal length of at least `min`.
pub fn check_correspondences(left: usize, right: usize, min: usize) -> DataflowResult<()> {
    if left != right || left < min {
        return Err(DataflowError::IllegalCorrespondences(format!(
            "{left} vs {right}, at least {min} required"
        )));
    }
    Ok(())
}
