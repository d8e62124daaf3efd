//! Client-side state that outlives a single page load: the current user and
//! the movie selected in a list.
//!
//! `ClientState` starts empty and hydrates each value from its `Storage` the
//! first time it is read; every write goes straight through to storage.
//! Without storage both values live in memory only and nothing fails.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::StoreError;
use crate::models::User;

pub const USER_KEY: &str = "user";
pub const SELECTED_ID_KEY: &str = "selectedId";

/// String key/value persistence, shaped like a browser's local storage.
pub trait Storage: Send {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-process storage. Clones share the same items, so a store rebuilt over a
/// clone sees what an earlier store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StoreError> {
        self.items().remove(key);
        Ok(())
    }
}

/// All items in one JSON object on disk. Writes go to a sibling temp file
/// that is then renamed over the original.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// An undecodable file is replaced by the next write instead of blocking it.
    fn read_for_write(&self) -> Result<HashMap<String, String>, StoreError> {
        match self.read_all() {
            Err(StoreError::Json(e)) => {
                warn!(
                    "Discarding unreadable client state in {}: {}",
                    self.path.display(),
                    e
                );
                Ok(HashMap::new())
            }
            other => other,
        }
    }

    fn write_all(&self, items: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(items)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.read_for_write()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StoreError> {
        let mut items = self.read_for_write()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}

pub struct ClientState {
    storage: Option<Box<dyn Storage>>,
    user: Option<User>,
    selected_id: Option<String>,
}

impl ClientState {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            storage: Some(storage),
            user: None,
            selected_id: None,
        }
    }

    pub fn without_storage() -> Self {
        Self {
            storage: None,
            user: None,
            selected_id: None,
        }
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn user(&mut self) -> Option<&User> {
        if self.user.is_none() {
            self.user = self
                .read(USER_KEY)
                .and_then(|raw| match serde_json::from_str(&raw) {
                    Ok(user) => Some(user),
                    Err(e) => {
                        warn!("Ignoring unreadable stored user: {}", e);
                        None
                    }
                });
        }
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: User) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&user)?;
        self.user = Some(user);
        if let Some(storage) = self.storage.as_mut() {
            storage.set_item(USER_KEY, &raw)?;
        }
        Ok(())
    }

    pub fn reset_user(&mut self) -> Result<(), StoreError> {
        self.user = None;
        if let Some(storage) = self.storage.as_mut() {
            storage.remove_item(USER_KEY)?;
        }
        Ok(())
    }

    /// Empty string when storage exists but holds nothing; `None` without storage.
    pub fn selected_id(&mut self) -> Option<&str> {
        if self.selected_id.is_none() && self.storage.is_some() {
            self.selected_id = Some(self.read(SELECTED_ID_KEY).unwrap_or_default());
        }
        self.selected_id.as_deref()
    }

    pub fn set_selected_id(&mut self, id: impl Into<String>) -> Result<(), StoreError> {
        let id = id.into();
        self.selected_id = Some(id.clone());
        if let Some(storage) = self.storage.as_mut() {
            storage.set_item(SELECTED_ID_KEY, &id)?;
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Option<String> {
        let storage = self.storage.as_ref()?;
        match storage.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read '{}' from client storage: {}", key, e);
                None
            }
        }
    }
}
