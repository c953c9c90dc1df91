//! Binary switches that HVAC devices act through.

use std::sync::{Arc, Mutex};

use crate::error::{ModelError, ModelResult};

/// Something that can be turned on and off.
pub trait Switch: Send {
    fn address(&self) -> &str;

    /// Set the state, returning the state actually reached.
    fn set_state(&mut self, on: bool) -> ModelResult<bool>;

    /// Current state, `None` if never set.
    fn state(&self) -> ModelResult<Option<bool>>;
}

/// In-memory switch.
///
/// Clones share state, so a test or a dashboard can hold a clone and watch what a
/// device does with it.
#[derive(Debug, Clone)]
pub struct NullSwitch {
    address: String,
    state: Arc<Mutex<Option<bool>>>,
}

impl NullSwitch {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Arc::new(Mutex::new(None)),
        }
    }

    fn poisoned(&self) -> ModelError {
        ModelError::Switch {
            address: self.address.clone(),
            what: "state lock poisoned".into(),
        }
    }
}

impl Switch for NullSwitch {
    fn address(&self) -> &str {
        &self.address
    }

    fn set_state(&mut self, on: bool) -> ModelResult<bool> {
        let mut state = self.state.lock().map_err(|_| self.poisoned())?;
        *state = Some(on);
        tracing::debug!(switch = %self.address, on, "set");
        Ok(on)
    }

    fn state(&self) -> ModelResult<Option<bool>> {
        let state = self.state.lock().map_err(|_| self.poisoned())?;
        Ok(*state)
    }
}
