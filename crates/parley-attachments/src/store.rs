//! Locator store: owns the bytes behind attachment handles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use parley_core::types::{Attachment, Locator};

use crate::error::AttachmentError;

/// Thread-safe map from locator to attachment bytes.
///
/// Bytes stay resident until the owning party calls `release`.
#[derive(Debug, Default)]
pub struct LocatorStore {
    blobs: RwLock<HashMap<Locator, Arc<[u8]>>>,
}

impl LocatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under a fresh locator.
    pub fn allocate(&self, bytes: Vec<u8>) -> Result<Locator, AttachmentError> {
        let locator = Locator::new();
        let len = bytes.len();
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| AttachmentError::StoreUnavailable(format!("lock poisoned: {}", e)))?;
        blobs.insert(locator, Arc::from(bytes));
        tracing::debug!(%locator, bytes = len, "Locator allocated");
        Ok(locator)
    }

    /// Shared view of the bytes behind `locator`.
    pub fn read(&self, locator: &Locator) -> Result<Arc<[u8]>, AttachmentError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| AttachmentError::StoreUnavailable(format!("lock poisoned: {}", e)))?;
        blobs
            .get(locator)
            .cloned()
            .ok_or(AttachmentError::LocatorNotFound(*locator))
    }

    /// Drop the bytes behind `locator`. Returns whether it was live.
    pub fn release(&self, locator: &Locator) -> bool {
        match self.blobs.write() {
            Ok(mut blobs) => {
                let released = blobs.remove(locator).is_some();
                if released {
                    tracing::debug!(%locator, "Locator released");
                }
                released
            }
            Err(e) => {
                tracing::error!("Locator store lock poisoned: {}", e);
                false
            }
        }
    }

    /// Release every locator referenced by `attachments`. Returns how many
    /// were live.
    pub fn release_all(&self, attachments: &[Attachment]) -> usize {
        attachments
            .iter()
            .filter(|a| self.release(&a.locator))
            .count()
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        self.blobs
            .read()
            .map(|b| b.contains_key(locator))
            .unwrap_or(false)
    }

    /// Number of live locators.
    pub fn live_count(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }
}
