//! Signal envelope and stream processing primitives for Home Climate Control.
//!
//! Everything that flows through the control pipeline is a [`Signal`]: a timestamped
//! value carrying a health [`Status`], an optional [`SignalError`] and an optional
//! payload that rides along unchanged (usually the name of the zone or sensor the
//! value belongs to).
//!
//! # Architecture
//!
//! - Processors implement [`SignalProcessor`]: one input signal yields zero or one
//!   output signal, synchronously.
//! - [`stream`] lifts any processor onto tokio channels so processors can be
//!   chained into pipelines running as independent tasks.
//! - [`filter`] holds the stock processors: median smoothing, rate limiting,
//!   value conversion, fallback between sources and timeout detection.

pub mod error;
pub mod filter;
pub mod processor;
pub mod signal;
pub mod stream;

pub use error::{FilterError, FilterResult};
pub use filter::{
    AnalogConverter, AnalogFilter, ConvertingFilter, FallbackFilter, GuardHandle, Identity, Lm34, MedianFilter,
    RateLimiter, SameSignal, TimeoutGuard, Tmp36, ValueEquals, MIN_TIMEOUT,
};
pub use processor::SignalProcessor;
pub use signal::{Signal, SignalError, Status};
pub use stream::{SignalReceiver, SignalSender, CHANNEL_CAPACITY};
