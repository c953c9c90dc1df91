//! hc-director: runs zones and a unit as tokio tasks.
//!
//! Contains:
//! - registry (latest zone status per zone, shared between producers and readers)
//! - director (one task per zone plus one aggregation task per unit)

pub mod director;
pub mod error;
pub mod registry;

pub use director::{UnitDirector, UnitDirectorBuilder, UnitKind, ZoneHandle, ZoneInput};
pub use error::{DirectorError, DirectorResult};
pub use registry::ZoneStatusRegistry;
