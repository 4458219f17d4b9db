//! Persistence of work the server has not acknowledged yet.
//!
//! ## Versioning
//!
//! - `SAVE_VERSION`: current format. Bump it when fields are added.
//! - `MIN_COMPATIBLE_VERSION`: oldest format still readable. Only bump it for
//!   breaking changes (a field removed or its meaning changed); adding fields
//!   keeps old saves loadable, missing fields take their defaults.
//!
//! A save that fails to parse or is older than `MIN_COMPATIBLE_VERSION` is
//! removed from storage and treated as absent.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::SaveError;
use crate::state::TapRecord;
use crate::time::Millis;

pub const SAVE_VERSION: u32 = 1;

pub const MIN_COMPATIBLE_VERSION: u32 = 1;

/// Key under which pending work is stored.
pub const STORAGE_KEY: &str = "tap_sync_pending";

/// String key/value store, shaped like the browser's `localStorage`.
pub trait Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>, SaveError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), SaveError>;
    fn remove_item(&mut self, key: &str) -> Result<(), SaveError>;
}

/// In-process storage. Clones share the same map, so a test can hand one
/// copy to a session and inspect the other.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, SaveError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), SaveError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), SaveError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// The browser's `localStorage`.
#[cfg(target_arch = "wasm32")]
pub struct LocalStorage {
    inner: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    /// None when storage is unavailable (private mode, sandboxed iframe).
    pub fn open() -> Option<Self> {
        let inner = web_sys::window()?.local_storage().ok()??;
        Some(Self { inner })
    }
}

#[cfg(target_arch = "wasm32")]
impl Storage for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, SaveError> {
        self.inner
            .get_item(key)
            .map_err(|e| SaveError::Storage(format!("{e:?}")))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), SaveError> {
        self.inner
            .set_item(key, value)
            .map_err(|e| SaveError::Storage(format!("{e:?}")))
    }

    fn remove_item(&mut self, key: &str) -> Result<(), SaveError> {
        self.inner
            .remove_item(key)
            .map_err(|e| SaveError::Storage(format!("{e:?}")))
    }
}

/// Everything a session needs to pick up after a reload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingSave {
    /// Unflushed taps, oldest first.
    pub taps: Vec<TapRecord>,
    /// Warning dedup table: key -> time shown.
    pub warnings: BTreeMap<String, Millis>,
}

#[derive(Serialize, Deserialize)]
struct SaveData {
    version: u32,
    pending: PendingSave,
}

pub fn write(storage: &mut impl Storage, pending: &PendingSave) -> Result<(), SaveError> {
    let json = serde_json::to_string(&SaveData {
        version: SAVE_VERSION,
        pending: pending.clone(),
    })?;
    storage.set_item(STORAGE_KEY, &json)
}

/// Load pending work. Unusable data is discarded and reported as `None`.
pub fn read(storage: &mut impl Storage) -> Result<Option<PendingSave>, SaveError> {
    let Some(json) = storage.get_item(STORAGE_KEY)? else {
        return Ok(None);
    };

    let data: SaveData = match serde_json::from_str(&json) {
        Ok(d) => d,
        Err(e) => {
            warn!("discarding unreadable pending taps: {e}");
            storage.remove_item(STORAGE_KEY)?;
            return Ok(None);
        }
    };

    if data.version < MIN_COMPATIBLE_VERSION {
        warn!(
            "discarding pending taps saved with version {} (oldest supported {})",
            data.version, MIN_COMPATIBLE_VERSION
        );
        storage.remove_item(STORAGE_KEY)?;
        return Ok(None);
    }

    Ok(Some(data.pending))
}

pub fn clear(storage: &mut impl Storage) -> Result<(), SaveError> {
    storage.remove_item(STORAGE_KEY)
}
