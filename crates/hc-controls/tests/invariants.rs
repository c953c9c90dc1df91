//! Every processor keeps the signal envelope consistent, whatever it is fed.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use hc_controls::{HalfLifeController, HysteresisController, PidConfig, PidController};
use hc_signal::{
    ConvertingFilter, FallbackFilter, MedianFilter, RateLimiter, Signal, SignalError,
    SignalProcessor, Tmp36, ValueEquals,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Input {
    Ok(f64),
    Partial(Option<f64>),
    Total,
}

fn arb_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        6 => (-50.0f64..50.0).prop_map(Input::Ok),
        2 => proptest::option::of(-50.0f64..50.0).prop_map(Input::Partial),
        2 => Just(Input::Total),
    ]
}

fn to_signals(inputs: &[Input]) -> Vec<Signal<f64, String>> {
    let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    inputs
        .iter()
        .enumerate()
        .map(|(n, input)| {
            let at = start + chrono::Duration::seconds(n as i64 * 10);
            let s = match input {
                Input::Ok(v) => Signal::ok(at, *v),
                Input::Partial(v) => Signal::partial(at, *v, SignalError::Stale { what: "sensor".into() }),
                Input::Total => Signal::failure(at, SignalError::Upstream("sensor".into())),
            };
            s.with_payload(if n % 2 == 0 { "a" } else { "b" }.to_string())
        })
        .collect()
}

fn check<T>(out: &[Signal<T, String>]) -> Result<(), TestCaseError> {
    for s in out {
        if s.is_ok() {
            prop_assert!(s.value().is_some());
            prop_assert!(s.error().is_none());
        }
        if s.is_error() {
            prop_assert!(s.value().is_none());
            prop_assert!(s.error().is_some());
        }
        if !s.is_ok() {
            prop_assert!(s.error().is_some());
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn filters_keep_envelope(inputs in proptest::collection::vec(arb_input(), 1..40), depth in 1usize..6) {
        let signals = to_signals(&inputs);

        let mut median = MedianFilter::<f64, String>::new(depth).unwrap();
        check(&median.process_all(signals.clone()))?;

        let mut limiter = RateLimiter::with_comparator(Duration::from_secs(15), ValueEquals);
        check(&limiter.process_all(signals.clone()))?;

        let mut converter = ConvertingFilter::analog(Tmp36);
        check(&converter.process_all(signals.clone()))?;

        let mut fallback = FallbackFilter::new(["a".to_string(), "b".to_string()]).unwrap();
        check(&fallback.process_all(signals))?;
    }

    #[test]
    fn controllers_keep_envelope(inputs in proptest::collection::vec(arb_input(), 1..40)) {
        let signals = to_signals(&inputs);

        let mut pid = PidController::<String>::new("pid", 20.0, PidConfig::new(1.0, 0.0001, 10.0, 5.0)).unwrap();
        let out = pid.process_all(signals.clone());
        prop_assert_eq!(out.len(), signals.len());
        check(&out)?;

        let mut hysteresis = HysteresisController::<String>::new("h", 0.0).unwrap();
        check(&hysteresis.process_all(signals.clone()))?;

        let mut half_life = HalfLifeController::<String>::new("hl", Duration::from_secs(60)).unwrap();
        check(&half_life.process_all(signals))?;
    }
}
