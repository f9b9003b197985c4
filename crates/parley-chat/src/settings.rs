//! Chat settings persistence.
//!
//! Settings live in a single JSON blob under [`SETTINGS_KEY`] in a
//! key-value store. Loading never fails: a missing or malformed blob yields
//! defaults. Saving is best-effort.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use parley_core::error::{ParleyError, Result};
use parley_core::types::ChatConfig;

use crate::error::ChatError;

/// Storage key of the settings blob.
pub const SETTINGS_KEY: &str = "parley.chat-config";

/// String key-value persistence.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

// =============================================================================
// Backends
// =============================================================================

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| ParleyError::Storage(format!("lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| ParleyError::Storage(format!("lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// Load / save
// =============================================================================

/// Read the stored settings, clamped into range. Falls back to defaults.
pub fn load(storage: &dyn KeyValueStorage) -> ChatConfig {
    let blob = match storage.get(SETTINGS_KEY) {
        Ok(Some(blob)) => blob,
        Ok(None) => return ChatConfig::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read chat settings, using defaults");
            return ChatConfig::default();
        }
    };
    match serde_json::from_str::<ChatConfig>(&blob) {
        Ok(config) => config.clamped(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored chat settings are malformed, using defaults");
            ChatConfig::default()
        }
    }
}

/// Persist `config`. Failures are logged and swallowed.
pub fn save(storage: &dyn KeyValueStorage, config: &ChatConfig) {
    let result = serde_json::to_string(config)
        .map_err(ParleyError::from)
        .and_then(|blob| storage.set(SETTINGS_KEY, &blob));
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to persist chat settings");
    }
}

// =============================================================================
// Live store
// =============================================================================

/// The process-wide chat settings, backed by a `KeyValueStorage`.
pub struct SettingsStore {
    storage: Arc<dyn KeyValueStorage>,
    current: RwLock<ChatConfig>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Load settings from `storage`.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let current = load(storage.as_ref());
        tracing::debug!(config = ?current, "Chat settings loaded");
        Self {
            storage,
            current: RwLock::new(current),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn current(&self) -> ChatConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate, install, and persist `config`.
    pub fn replace(&self, config: ChatConfig) -> std::result::Result<ChatConfig, ChatError> {
        config.validate()?;
        {
            let mut current = self
                .current
                .write()
                .map_err(|e| ChatError::Settings(format!("settings lock poisoned: {}", e)))?;
            *current = config.clone();
        }
        save(self.storage.as_ref(), &config);
        tracing::info!(model = %config.model, mode = ?config.mode, "Chat settings updated");
        Ok(config)
    }

    /// Apply `f` to a copy of the current settings, then `replace`.
    pub fn update(
        &self,
        f: impl FnOnce(&mut ChatConfig),
    ) -> std::result::Result<ChatConfig, ChatError> {
        let mut next = self.current();
        f(&mut next);
        self.replace(next)
    }

    /// Restore and persist defaults.
    pub fn reset(&self) -> ChatConfig {
        let defaults = ChatConfig::default();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = defaults.clone();
        save(self.storage.as_ref(), &defaults);
        tracing::info!("Chat settings reset to defaults");
        defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ChatMode;

    struct FailingStorage;

    impl KeyValueStorage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(ParleyError::Storage("disk unavailable".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(ParleyError::Storage("disk full".into()))
        }
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let storage = MemoryStorage::new();
        assert_eq!(load(&storage), ChatConfig::default());
    }

    #[test]
    fn test_load_corrupt_returns_defaults() {
        let storage = MemoryStorage::new();
        storage.set(SETTINGS_KEY, "{not json").unwrap();
        assert_eq!(load(&storage), ChatConfig::default());
    }

    #[test]
    fn test_load_clamps_out_of_range() {
        let storage = MemoryStorage::new();
        storage
            .set(
                SETTINGS_KEY,
                r#"{"mode":"advanced","temperature":7.5,"maxTokens":50}"#,
            )
            .unwrap();
        let config = load(&storage);
        assert_eq!(config.mode, ChatMode::Advanced);
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.max_tokens, 100);
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn test_save_then_load_equal() {
        let storage = MemoryStorage::new();
        let config = ChatConfig {
            mode: ChatMode::Advanced,
            model: "gpt-4o".into(),
            temperature: 1.2,
            max_tokens: 2048,
            enable_voice: false,
            enable_annotations: false,
            credential: "sk-abcdefghijklmnopqrstu".into(),
        };
        save(&storage, &config);
        assert_eq!(load(&storage), config);
    }

    #[test]
    fn test_failing_storage_is_best_effort() {
        let storage = FailingStorage;
        assert_eq!(load(&storage), ChatConfig::default());
        save(&storage, &ChatConfig::default());
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("data"));
        assert_eq!(storage.get(SETTINGS_KEY).unwrap(), None);

        storage.set(SETTINGS_KEY, "{}").unwrap();
        assert_eq!(storage.get(SETTINGS_KEY).unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("data").join("parley.chat-config.json").exists());
    }

    #[test]
    fn test_store_replace_persists() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let store = SettingsStore::new(Arc::clone(&storage));

        let mut config = store.current();
        config.model = "gpt-4o".into();
        store.replace(config).unwrap();

        assert_eq!(store.current().model, "gpt-4o");
        let reopened = SettingsStore::new(storage);
        assert_eq!(reopened.current().model, "gpt-4o");
    }

    #[test]
    fn test_store_replace_rejects_invalid() {
        let store = SettingsStore::in_memory();
        let mut config = store.current();
        config.temperature = 3.0;
        assert!(matches!(store.replace(config), Err(ChatError::Settings(_))));
        assert_eq!(store.current().temperature, 0.7);
    }

    #[test]
    fn test_store_update_and_reset() {
        let store = SettingsStore::in_memory();
        store.update(|c| c.enable_voice = false).unwrap();
        assert!(!store.current().enable_voice);

        let defaults = store.reset();
        assert_eq!(defaults, ChatConfig::default());
        assert!(store.current().enable_voice);
    }

    #[test]
    fn test_store_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage
            .set(SETTINGS_KEY, r#"{"model":"gpt-4.1","maxTokens":3000}"#)
            .unwrap();
        let store = SettingsStore::new(Arc::new(storage));
        assert_eq!(store.current().model, "gpt-4.1");
        assert_eq!(store.current().max_tokens, 3000);
        assert_eq!(store.current().temperature, 0.7);
    }
}
