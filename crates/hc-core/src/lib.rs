//! hc-core: shared foundation for the home climate control crates.
//!
//! Contains:
//! - error (shared error type)
//! - numeric (float helpers)
//! - time (wall clock timestamps and injectable clocks)

pub mod error;
pub mod numeric;
pub mod time;

pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use time::*;
