//! The signal envelope.
//!
//! A [`Signal`] can only be built through constructors that keep its invariants:
//!
//! - an `Ok` signal always carries a value and never an error,
//! - a `FailurePartial` signal always carries an error and may carry a value,
//! - a `FailureTotal` signal always carries an error and never a value.

use std::fmt;
use std::time::Duration;

use hc_core::Timestamp;
use thiserror::Error;

/// Health of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Value is trustworthy.
    Ok,
    /// Something went wrong, but the value (if any) is still usable.
    FailurePartial,
    /// No usable value.
    FailureTotal,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::FailurePartial => "FAILURE_PARTIAL",
            Status::FailureTotal => "FAILURE_TOTAL",
        };
        f.write_str(s)
    }
}

/// Why a signal is not healthy.
///
/// Signals are cloned freely through fan-out pipelines, so the error is plain data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalError {
    /// No signal arrived on the named stream for longer than the allowed timeout.
    #[error("{marker}: no signal for {timeout:?}")]
    Timeout { marker: String, timeout: Duration },

    /// The device the signal should have come from is not present.
    #[error("Device absent: {address}")]
    DeviceAbsent { address: String },

    /// Input could not be interpreted.
    #[error("Malformed input: {what}")]
    Malformed { what: String },

    /// The value is too old to be trusted.
    #[error("Stale signal: {what}")]
    Stale { what: String },

    /// Value conversion failed.
    #[error("Conversion failed: {what}")]
    Conversion { what: String },

    /// Failure reported by an upstream producer.
    #[error("{0}")]
    Upstream(String),
}

/// Timestamped value with health status and optional payload.
///
/// `P` defaults to `()` for signals that need no payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal<T, P = ()> {
    timestamp: Timestamp,
    value: Option<T>,
    payload: Option<P>,
    status: Status,
    error: Option<SignalError>,
}

impl<T, P> Signal<T, P> {
    /// Healthy signal.
    pub fn ok(timestamp: Timestamp, value: T) -> Self {
        Self {
            timestamp,
            value: Some(value),
            payload: None,
            status: Status::Ok,
            error: None,
        }
    }

    /// Degraded signal. The value may or may not be present.
    pub fn partial(timestamp: Timestamp, value: Option<T>, error: SignalError) -> Self {
        Self {
            timestamp,
            value,
            payload: None,
            status: Status::FailurePartial,
            error: Some(error),
        }
    }

    /// Signal with no usable value.
    pub fn failure(timestamp: Timestamp, error: SignalError) -> Self {
        Self {
            timestamp,
            value: None,
            payload: None,
            status: Status::FailureTotal,
            error: Some(error),
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Same signal with a payload of a different type.
    pub fn with_payload_of<Q>(self, payload: Option<Q>) -> Signal<T, Q> {
        Signal {
            timestamp: self.timestamp,
            value: self.value,
            payload,
            status: self.status,
            error: self.error,
        }
    }

    /// Same signal downgraded to a partial failure carrying `error`.
    ///
    /// A total failure stays a total failure.
    pub fn degrade(self, error: SignalError) -> Self {
        if self.status == Status::FailureTotal {
            return self;
        }
        Self {
            status: Status::FailurePartial,
            error: Some(error),
            ..self
        }
    }

    /// Same signal, stamped with a different time.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> Option<&SignalError> {
        self.error.as_ref()
    }

    /// `true` only for [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// `true` only for [`Status::FailureTotal`].
    pub fn is_error(&self) -> bool {
        self.status == Status::FailureTotal
    }

    /// Transform the value, keeping timestamp, status, error and payload.
    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> Signal<U, P> {
        Signal {
            timestamp: self.timestamp,
            value: self.value.map(f),
            payload: self.payload,
            status: self.status,
            error: self.error,
        }
    }

    /// Transform the value with a fallible function.
    ///
    /// A failed conversion turns the signal into a total failure carrying the
    /// conversion error; the payload is kept.
    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U, SignalError>) -> Signal<U, P> {
        let Signal {
            timestamp,
            value,
            payload,
            status,
            error,
        } = self;

        match value.map(f) {
            Some(Err(e)) => Signal {
                timestamp,
                value: None,
                payload,
                status: Status::FailureTotal,
                error: Some(e),
            },
            converted => Signal {
                timestamp,
                value: converted.and_then(Result::ok),
                payload,
                status,
                error,
            },
        }
    }

    /// Carry this signal's timestamp, status, error and payload over to a new value.
    ///
    /// Used by processors that compute a fresh value from an input signal. A `None`
    /// value on a healthy input degrades to a total failure.
    pub fn derive<U>(&self, value: Option<U>) -> Signal<U, P>
    where
        P: Clone,
    {
        let payload = self.payload.clone();
        match (self.status, value) {
            (Status::FailureTotal, _) => Signal {
                timestamp: self.timestamp,
                value: None,
                payload,
                status: Status::FailureTotal,
                error: self.error.clone(),
            },
            (Status::Ok, Some(v)) => Signal {
                timestamp: self.timestamp,
                value: Some(v),
                payload,
                status: Status::Ok,
                error: None,
            },
            (Status::Ok, None) => Signal {
                timestamp: self.timestamp,
                value: None,
                payload,
                status: Status::FailureTotal,
                error: Some(SignalError::Malformed {
                    what: "processor produced no value".into(),
                }),
            },
            (Status::FailurePartial, v) => Signal {
                timestamp: self.timestamp,
                value: v,
                payload,
                status: Status::FailurePartial,
                error: self.error.clone(),
            },
        }
    }
}

impl<T: fmt::Display, P: fmt::Debug> fmt::Display for Signal<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} ", self.timestamp.to_rfc3339())?;
        match &self.value {
            Some(v) => write!(f, "value={v}")?,
            None => f.write_str("value=none")?,
        }
        if let Some(p) = &self.payload {
            write!(f, ", payload={p:?}")?;
        }
        write!(f, ", status={}", self.status)?;
        if let Some(e) = &self.error {
            write!(f, ", error={e}")?;
        }
        f.write_str("}")
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn arb_signal() -> impl Strategy<Value = Signal<f64>> {
        let t = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        prop_oneof![
            any::<f64>().prop_map(move |v| Signal::ok(t, v)),
            proptest::option::of(any::<f64>()).prop_map(move |v| Signal::partial(
                t,
                v,
                SignalError::Upstream("p".into())
            )),
            Just(Signal::failure(t, SignalError::Upstream("t".into()))),
        ]
    }

    proptest! {
        #[test]
        fn envelope_invariants_hold(s in arb_signal()) {
            match s.status() {
                Status::Ok => {
                    prop_assert!(s.value().is_some());
                    prop_assert!(s.error().is_none());
                }
                Status::FailurePartial => prop_assert!(s.error().is_some()),
                Status::FailureTotal => {
                    prop_assert!(s.value().is_none());
                    prop_assert!(s.error().is_some());
                }
            }
            prop_assert_eq!(s.is_ok(), s.status() == Status::Ok);
            prop_assert_eq!(s.is_error(), s.status() == Status::FailureTotal);
        }

        #[test]
        fn derive_keeps_invariants(s in arb_signal(), v in proptest::option::of(any::<i32>())) {
            let d = s.derive(v);
            if d.is_ok() {
                prop_assert!(d.value().is_some());
            }
            if d.is_error() {
                prop_assert!(d.value().is_none());
                prop_assert!(d.error().is_some());
            }
        }
    }
}
