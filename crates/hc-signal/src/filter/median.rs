//! Sliding window median.
//!
//! Keeps the last `depth` signals. Until the window fills up, the median is taken
//! over whatever is buffered, so the output ramps up instead of waiting.
//!
//! Only signals carrying a value take part in the median. If every buffered signal
//! is a total failure, or none has a value, the output is a total failure carrying
//! the most recent error. If any buffered signal is unhealthy, the output is
//! degraded to a partial failure with the most recent error.

use std::cmp::Ordering;
use std::collections::VecDeque;

use hc_core::average;

use crate::error::{FilterError, FilterResult};
use crate::processor::SignalProcessor;
use crate::signal::{Signal, SignalError};

/// Median over a sliding window of signals.
pub struct MedianFilter<T, P = ()> {
    depth: usize,
    buffer: VecDeque<Signal<T, P>>,
    average: fn(&T, &T) -> T,
}

impl<P> MedianFilter<f64, P> {
    /// Median filter over `f64` values; even windows average the two middle values.
    pub fn new(depth: usize) -> FilterResult<Self> {
        Self::with_average(depth, |a, b| average(*a, *b))
    }
}

impl<T, P> MedianFilter<T, P> {
    /// Median filter with a custom way of averaging the two middle values.
    pub fn with_average(depth: usize, average: fn(&T, &T) -> T) -> FilterResult<Self> {
        if depth == 0 {
            return Err(FilterError::InvalidArg {
                what: "median filter depth must be positive",
            });
        }
        Ok(Self {
            depth,
            buffer: VecDeque::with_capacity(depth),
            average,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<T, P> MedianFilter<T, P>
where
    T: PartialOrd + Clone,
    P: Clone,
{
    fn latest_error(&self) -> Option<SignalError> {
        self.buffer.iter().rev().find_map(|s| s.error().cloned())
    }

    fn median(&self, trigger: &Signal<T, P>) -> Signal<T, P> {
        let timestamp = trigger.timestamp();
        let fallback_error = || SignalError::Upstream("no usable values in median window".into());

        let mut values: Vec<&T> = self.buffer.iter().filter_map(|s| s.value()).collect();
        if values.is_empty() || self.buffer.iter().all(|s| s.is_error()) {
            let error = self.latest_error().unwrap_or_else(fallback_error);
            return attach(Signal::failure(timestamp, error), trigger);
        }

        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let n = values.len();
        let value = if n % 2 == 1 {
            values[(n - 1) / 2].clone()
        } else {
            (self.average)(values[n / 2 - 1], values[n / 2])
        };

        let signal = if self.buffer.iter().all(|s| s.is_ok()) {
            Signal::ok(timestamp, value)
        } else {
            let error = self.latest_error().unwrap_or_else(fallback_error);
            Signal::partial(timestamp, Some(value), error)
        };
        attach(signal, trigger)
    }
}

fn attach<T, P: Clone>(signal: Signal<T, P>, trigger: &Signal<T, P>) -> Signal<T, P> {
    match trigger.payload() {
        Some(p) => signal.with_payload(p.clone()),
        None => signal,
    }
}

impl<T, P> SignalProcessor<T, T, P> for MedianFilter<T, P>
where
    T: PartialOrd + Clone,
    P: Clone,
{
    fn process(&mut self, signal: Signal<T, P>) -> Option<Signal<T, P>> {
        if self.buffer.len() == self.depth {
            self.buffer.pop_front();
        }
        self.buffer.push_back(signal.clone());

        if self.buffer.len() == 1 {
            return Some(signal);
        }
        Some(self.median(&signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use hc_core::Timestamp;

    fn t(i: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + Duration::seconds(i)
    }

    fn run(depth: usize, input: &[f64]) -> Vec<f64> {
        let mut filter = MedianFilter::<f64>::new(depth).unwrap();
        let signals = input
            .iter()
            .enumerate()
            .map(|(i, v)| Signal::ok(t(i as i64), *v));
        filter
            .process_all(signals)
            .into_iter()
            .map(|s| *s.value().unwrap())
            .collect()
    }

    #[test]
    fn zero_depth_rejected() {
        assert!(MedianFilter::<f64>::new(0).is_err());
    }

    #[test]
    fn depth_three() {
        assert_eq!(run(3, &[1.0, 2.0, 3.0, 4.0, 5.0]), vec![1.0, 1.5, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn depth_two() {
        assert_eq!(run(2, &[1.0, 2.0, 3.0, 4.0, 5.0]), vec![1.0, 1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn depth_five() {
        assert_eq!(
            run(5, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
            vec![1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn depth_four() {
        assert_eq!(
            run(4, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
            vec![1.0, 1.5, 2.0, 2.5, 3.5, 4.5, 5.5]
        );
    }

    #[test]
    fn depth_one_passes_through() {
        assert_eq!(run(1, &[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn all_errors_give_total_failure() {
        let mut filter = MedianFilter::<f64>::new(2).unwrap();
        let out = filter.process_all(vec![
            Signal::failure(t(0), SignalError::Upstream("first".into())),
            Signal::failure(t(1), SignalError::Upstream("second".into())),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.is_error()));
        assert_eq!(out[1].error(), Some(&SignalError::Upstream("second".into())));
    }

    #[test]
    fn error_in_window_degrades_output() {
        let mut filter = MedianFilter::<f64>::new(3).unwrap();
        let out = filter.process_all(vec![
            Signal::ok(t(0), 1.0),
            Signal::failure(t(1), SignalError::Upstream("blip".into())),
            Signal::ok(t(2), 3.0),
        ]);
        let last = &out[2];
        assert!(!last.is_ok());
        assert!(!last.is_error());
        assert_eq!(last.value(), Some(&2.0));
    }

    #[test]
    fn payload_follows_trigger() {
        let mut filter = MedianFilter::<f64, &str>::new(2).unwrap();
        let out = filter.process_all(vec![
            Signal::ok(t(0), 1.0).with_payload("a"),
            Signal::ok(t(1), 2.0).with_payload("b"),
        ]);
        assert_eq!(out[1].payload(), Some(&"b"));
        assert_eq!(out[1].timestamp(), t(1));
    }
}
