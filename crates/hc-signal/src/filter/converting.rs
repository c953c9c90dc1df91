//! Value conversion, and the stock analog temperature sensor converters.

use std::marker::PhantomData;

use crate::processor::SignalProcessor;
use crate::signal::{Signal, SignalError};

/// Turns a raw reading into an engineering value.
pub trait AnalogConverter: Send {
    fn convert(&self, raw: f64) -> Result<f64, SignalError>;
}

/// LM34: 10 mV per degree Fahrenheit. Input in millivolts, output in Celsius.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lm34;

impl AnalogConverter for Lm34 {
    fn convert(&self, millivolts: f64) -> Result<f64, SignalError> {
        finite(millivolts)?;
        let fahrenheit = millivolts / 10.0;
        Ok((fahrenheit - 32.0) * 5.0 / 9.0)
    }
}

/// TMP36: 10 mV per degree Celsius with a 500 mV offset. Input in millivolts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmp36;

impl AnalogConverter for Tmp36 {
    fn convert(&self, millivolts: f64) -> Result<f64, SignalError> {
        finite(millivolts)?;
        Ok((millivolts - 500.0) / 10.0)
    }
}

fn finite(v: f64) -> Result<(), SignalError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(SignalError::Conversion {
            what: format!("non-finite reading {v}"),
        })
    }
}

/// Applies a conversion to every signal value.
///
/// Status, error, timestamp and payload carry over. A failed conversion turns the
/// signal into a total failure.
pub struct ConvertingFilter<I, O, F> {
    convert: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> ConvertingFilter<I, O, F>
where
    F: FnMut(I) -> Result<O, SignalError>,
{
    pub fn new(convert: F) -> Self {
        Self {
            convert,
            _types: PhantomData,
        }
    }
}

/// Converting filter built from an [`AnalogConverter`].
pub type AnalogFilter = ConvertingFilter<f64, f64, Box<dyn FnMut(f64) -> Result<f64, SignalError> + Send>>;

impl AnalogFilter {
    /// Filter driven by an analog sensor converter.
    pub fn analog<C: AnalogConverter + 'static>(converter: C) -> Self {
        Self::new(Box::new(move |raw| converter.convert(raw)))
    }
}

impl<I, O, P, F> SignalProcessor<I, O, P> for ConvertingFilter<I, O, F>
where
    F: FnMut(I) -> Result<O, SignalError>,
{
    fn process(&mut self, signal: Signal<I, P>) -> Option<Signal<O, P>> {
        Some(signal.try_map(&mut self.convert))
    }
}
