//! Timestamped, shared payloads.

use super::timestamp::Timestamp;
use crate::dataflow::error::{DataflowError, DataflowResult};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A timestamp paired with a reference-counted payload.
///
/// Cloning is cheap and shares the payload. A default-constructed
/// measurement is invalid: it has no payload and [`Measurement::value`]
/// returns [`DataflowError::EmptyMeasurement`].
pub struct Measurement<T> {
    time: Timestamp,
    payload: Option<Arc<T>>,
}

impl<T> Measurement<T> {
    pub fn new(time: Timestamp, value: T) -> Self {
        Self {
            time,
            payload: Some(Arc::new(value)),
        }
    }

    pub fn from_shared(time: Timestamp, value: Arc<T>) -> Self {
        Self {
            time,
            payload: Some(value),
        }
    }

    /// An invalid measurement carrying only a time.
    pub fn invalid(time: Timestamp) -> Self {
        Self {
            time,
            payload: None,
        }
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn is_valid(&self) -> bool {
        self.payload.is_some()
    }

    /// The payload, or `EmptyMeasurement` when invalid.
    pub fn value(&self) -> DataflowResult<&T> {
        self.payload.as_deref().ok_or(DataflowError::EmptyMeasurement)
    }

    pub fn shared(&self) -> DataflowResult<Arc<T>> {
        self.payload.clone().ok_or(DataflowError::EmptyMeasurement)
    }

    /// Same payload, new timestamp.
    #[must_use]
    pub fn retimed(&self, time: Timestamp) -> Self {
        Self {
            time,
            payload: self.payload.clone(),
        }
    }

    /// Apply `f` to the payload keeping the timestamp.
    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> DataflowResult<Measurement<U>> {
        Ok(Measurement::new(self.time, f(self.value()?)))
    }

    /// Orders by time only.
    pub fn time_order(a: &Self, b: &Self) -> Ordering {
        a.time.cmp(&b.time)
    }
}

impl<T: Clone> Measurement<T> {
    /// Mutable access; clones the payload if it is shared.
    pub fn value_mut(&mut self) -> DataflowResult<&mut T> {
        self.payload
            .as_mut()
            .map(Arc::make_mut)
            .ok_or(DataflowError::EmptyMeasurement)
    }
}

impl<T> Clone for Measurement<T> {
    fn clone(&self) -> Self {
        Self {
            time: self.time,
            payload: self.payload.clone(),
        }
    }
}

impl<T> Default for Measurement<T> {
    fn default() -> Self {
        Self::invalid(Timestamp::ZERO)
    }
}

impl<T: fmt::Debug> fmt::Debug for Measurement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(v) => write!(f, "Measurement({}, {:?})", self.time.to_short_string(), v),
            None => write!(f, "Measurement({}, <empty>)", self.time.to_short_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_round_trip() {
        let m = Measurement::new(Timestamp::from_millis(42), 3.5f64);
        assert_eq!(m.time(), Timestamp::from_millis(42));
        assert_eq!(*m.value().unwrap(), 3.5);
        assert!(m.is_valid());
    }

    #[test]
    fn test_default_is_invalid() {
        let m: Measurement<f64> = Measurement::default();
        assert!(!m.is_valid());
        assert!(matches!(m.value(), Err(DataflowError::EmptyMeasurement)));
    }

    #[test]
    fn test_clone_shares_payload() {
        let m = Measurement::new(Timestamp::ZERO, vec![1.0, 2.0]);
        let c = m.retimed(Timestamp::from_millis(5));
        assert!(Arc::ptr_eq(&m.shared().unwrap(), &c.shared().unwrap()));
        assert_eq!(c.time(), Timestamp::from_millis(5));
    }

    #[test]
    fn test_copy_on_write() {
        let m = Measurement::new(Timestamp::ZERO, vec![1.0]);
        let mut c = m.clone();
        c.value_mut().unwrap().push(2.0);
        assert_eq!(m.value().unwrap().len(), 1);
        assert_eq!(c.value().unwrap().len(), 2);
    }

    #[test]
    fn test_time_order_ignores_payload() {
        let a = Measurement::new(Timestamp::from_nanos(1), 9.0);
        let b = Measurement::new(Timestamp::from_nanos(2), 1.0);
        assert_eq!(Measurement::time_order(&a, &b), Ordering::Less);
    }
}
