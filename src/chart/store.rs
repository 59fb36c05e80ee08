//! File-backed store of user profiles and chart readings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ChartReading, UserProfile};
use crate::error::AstroLiveError;
use crate::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    users: BTreeMap<Uuid, UserProfile>,
    readings: BTreeMap<String, ChartReading>,
}

/// Profiles keyed by user id and readings keyed by username.
///
/// Every write is persisted to the backing file, if any, through a temp
/// file and a rename.
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl LocalStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "opened local store");

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData::default()),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or replace a profile.
    pub fn upsert_user(&self, user: UserProfile) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| AstroLiveError::LockPoisoned)?;
        data.users.insert(user.user_id, user);
        self.persist(&data)
    }

    /// Profile by id.
    pub fn user(&self, user_id: &Uuid) -> Result<Option<UserProfile>> {
        let data = self.data.read().map_err(|_| AstroLiveError::LockPoisoned)?;
        Ok(data.users.get(user_id).cloned())
    }

    /// All profiles, oldest first.
    pub fn users(&self) -> Result<Vec<UserProfile>> {
        let data = self.data.read().map_err(|_| AstroLiveError::LockPoisoned)?;
        let mut users: Vec<_> = data.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    pub fn user_count(&self) -> Result<usize> {
        let data = self.data.read().map_err(|_| AstroLiveError::LockPoisoned)?;
        Ok(data.users.len())
    }

    /// Whether any profile exists.
    pub fn user_exists(&self) -> Result<bool> {
        Ok(self.user_count()? > 0)
    }

    /// Insert or replace the reading for its username.
    pub fn upsert_reading(&self, reading: ChartReading) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| AstroLiveError::LockPoisoned)?;
        data.readings.insert(reading.username.clone(), reading);
        self.persist(&data)
    }

    /// Reading for `username`.
    pub fn reading(&self, username: &str) -> Result<Option<ChartReading>> {
        let data = self.data.read().map_err(|_| AstroLiveError::LockPoisoned)?;
        Ok(data.readings.get(username).cloned())
    }

    /// All readings, newest first.
    pub fn readings(&self) -> Result<Vec<ChartReading>> {
        let data = self.data.read().map_err(|_| AstroLiveError::LockPoisoned)?;
        let mut readings: Vec<_> = data.readings.values().cloned().collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(readings)
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(data)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
