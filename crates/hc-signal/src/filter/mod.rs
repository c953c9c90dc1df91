//! Stock signal processors.

pub mod converting;
pub mod fallback;
pub mod median;
pub mod rate_limiter;
pub mod timeout_guard;

pub use converting::{AnalogConverter, AnalogFilter, ConvertingFilter, Lm34, Tmp36};
pub use fallback::FallbackFilter;
pub use median::MedianFilter;
pub use rate_limiter::{Identity, RateLimiter, SameSignal, ValueEquals};
pub use timeout_guard::{GuardHandle, TimeoutGuard, MIN_TIMEOUT};
