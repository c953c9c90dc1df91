//! Picks one signal source out of a prioritized list of redundant ones.
//!
//! Sources are told apart by payload. A source counts as healthy until it sends a
//! total failure, and becomes healthy again with its next non-failing signal.

use std::fmt::Debug;

use hc_core::Timestamp;

use crate::error::{FilterError, FilterResult};
use crate::processor::SignalProcessor;
use crate::signal::{Signal, SignalError};

struct Source<P> {
    id: P,
    failed: Option<(Timestamp, SignalError)>,
}

/// Passes signals from the highest priority healthy source only.
///
/// While a lower priority source is serving, the output is degraded to a partial
/// failure carrying the most recent error of the failed sources. When all sources
/// are failing, the failure itself is passed through.
pub struct FallbackFilter<P> {
    sources: Vec<Source<P>>,
}

impl<P: PartialEq + Debug> FallbackFilter<P> {
    /// `sources` in priority order, highest first.
    pub fn new(sources: impl IntoIterator<Item = P>) -> FilterResult<Self> {
        let mut list: Vec<Source<P>> = Vec::new();
        for id in sources {
            if list.iter().any(|s| s.id == id) {
                return Err(FilterError::DuplicateSource {
                    name: format!("{id:?}"),
                });
            }
            list.push(Source { id, failed: None });
        }
        if list.is_empty() {
            return Err(FilterError::InvalidArg {
                what: "fallback filter needs at least one source",
            });
        }
        Ok(Self { sources: list })
    }

    fn most_recent_failure(&self) -> Option<&SignalError> {
        self.sources
            .iter()
            .filter_map(|s| s.failed.as_ref())
            .max_by_key(|(at, _)| *at)
            .map(|(_, e)| e)
    }
}

impl<T, P> SignalProcessor<T, T, P> for FallbackFilter<P>
where
    P: PartialEq + Debug,
{
    fn process(&mut self, signal: Signal<T, P>) -> Option<Signal<T, P>> {
        let Some(index) = signal
            .payload()
            .and_then(|p| self.sources.iter().position(|s| &s.id == p))
        else {
            tracing::warn!(payload = ?signal.payload(), "signal from unknown source, dropped");
            return None;
        };

        self.sources[index].failed = if signal.is_error() {
            let error = signal
                .error()
                .cloned()
                .unwrap_or_else(|| SignalError::Upstream("failed source".into()));
            Some((signal.timestamp(), error))
        } else {
            None
        };

        let Some(active) = self.sources.iter().position(|s| s.failed.is_none()) else {
            return Some(signal);
        };
        if active != index {
            return None;
        }
        if active == 0 && self.sources.iter().all(|s| s.failed.is_none()) {
            return Some(signal);
        }

        let error = signal
            .error()
            .cloned()
            .or_else(|| self.most_recent_failure().cloned())
            .unwrap_or_else(|| SignalError::Upstream("fallback source active".into()));
        Some(signal.degrade(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use crate::signal::Status;

    fn t(s: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + Duration::seconds(s)
    }

    fn err(what: &str) -> SignalError {
        SignalError::Upstream(what.into())
    }

    #[test]
    fn empty_source_list_rejected() {
        assert!(FallbackFilter::<&str>::new(Vec::new()).is_err());
    }

    #[test]
    fn priority_chain() {
        let mut filter = FallbackFilter::new(["A", "B", "C"]).unwrap();
        let out = filter.process_all(vec![
            Signal::ok(t(1), 1).with_payload("A"),
            Signal::ok(t(2), 2).with_payload("B"),
            Signal::ok(t(3), 3).with_payload("C"),
            Signal::partial(t(4), Some(4), err("timeout A")).with_payload("A"),
            Signal::failure(t(5), err("io B")).with_payload("B"),
            Signal::partial(t(6), Some(5), err("unsupported C")).with_payload("C"),
            Signal::failure(t(7), err("state A")).with_payload("A"),
            Signal::failure(t(8), err("state B")).with_payload("B"),
            Signal::failure(t(9), err("state C")).with_payload("C"),
            Signal::ok(t(10), 6).with_payload("B"),
            Signal::ok(t(11), 7).with_payload("D"),
        ]);

        assert_eq!(out.len(), 4);

        assert_eq!(out[0].value(), Some(&1));
        assert_eq!(out[0].status(), Status::Ok);

        assert_eq!(out[1].value(), Some(&4));
        assert_eq!(out[1].status(), Status::FailurePartial);
        assert_eq!(out[1].error(), Some(&err("timeout A")));

        assert_eq!(out[2].payload(), Some(&"C"));
        assert_eq!(out[2].status(), Status::FailureTotal);

        assert_eq!(out[3].value(), Some(&6));
        assert_eq!(out[3].payload(), Some(&"B"));
        assert_eq!(out[3].status(), Status::FailurePartial);
        assert_eq!(out[3].error(), Some(&err("state C")));
    }
}
