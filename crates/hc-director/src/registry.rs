//! Latest zone status per zone.
//!
//! Zone tasks write, dashboards and bridges read. The last write for a zone wins,
//! in arrival order; signal timestamps are not compared.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use hc_model::{ZoneState, ZoneStatus};
use hc_signal::Signal;

use crate::error::{DirectorError, DirectorResult};

type ZoneSignal = Signal<ZoneStatus, String>;

/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ZoneStatusRegistry {
    inner: Arc<RwLock<BTreeMap<String, ZoneSignal>>>,
}

impl ZoneStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a zone signal, keyed by its payload. Returns the signal it replaced.
    pub fn update(&self, signal: ZoneSignal) -> DirectorResult<Option<ZoneSignal>> {
        let Some(name) = signal.payload().cloned() else {
            return Err(DirectorError::InvalidArg {
                what: "zone signal without a zone name",
            });
        };
        let mut map = self.inner.write().map_err(|_| DirectorError::Poisoned {
            what: "zone status registry",
        })?;
        Ok(map.insert(name, signal))
    }

    pub fn get(&self, zone: &str) -> DirectorResult<Option<ZoneSignal>> {
        Ok(self.read()?.get(zone).cloned())
    }

    /// Copy of everything known right now.
    pub fn snapshot(&self) -> DirectorResult<BTreeMap<String, ZoneSignal>> {
        Ok(self.read()?.clone())
    }

    pub fn states(&self) -> DirectorResult<BTreeMap<String, ZoneState>> {
        Ok(self
            .read()?
            .iter()
            .map(|(name, signal)| (name.clone(), ZoneState::of(signal)))
            .collect())
    }

    pub fn len(&self) -> DirectorResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> DirectorResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> DirectorResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, ZoneSignal>>> {
        self.inner.read().map_err(|_| DirectorError::Poisoned {
            what: "zone status registry",
        })
    }
}
