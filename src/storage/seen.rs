use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, HarvestError};

/// Listing ids already notified in earlier runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` when the id was not present yet.
    pub fn insert(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for SeenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Durable, append-only record of notified ids. There is no removal.
#[async_trait]
pub trait SeenRegistry: Send + Sync {
    /// Snapshot of every id recorded so far; empty on first run.
    async fn load(&self) -> Result<SeenSet>;

    /// Record one id. Durable once this returns.
    async fn append(&self, id: &str) -> Result<()>;
}

/// One id per line in a plain text file.
pub struct FileSeenRegistry {
    path: PathBuf,
}

impl FileSeenRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SeenRegistry for FileSeenRegistry {
    async fn load(&self) -> Result<SeenSet> {
        if !self.path.exists() {
            info!("No seen-listings file at {:?}, starting with an empty set", self.path);
            return Ok(SeenSet::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| HarvestError::StorageError(format!("Failed to read seen listings: {}", e)))?;

        let seen: SeenSet = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        info!("Loaded {} seen listing ids from {:?}", seen.len(), self.path);
        Ok(seen)
    }

    async fn append(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HarvestError::StorageError(format!("Failed to create directory: {}", e)))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarvestError::StorageError(format!("Failed to open seen listings: {}", e)))?;

        writeln!(file, "{}", id)
            .map_err(|e| HarvestError::StorageError(format!("Failed to append seen listing: {}", e)))?;

        file.sync_data()
            .map_err(|e| HarvestError::StorageError(format!("Failed to flush seen listings: {}", e)))?;

        debug!("Recorded seen listing {}", id);
        Ok(())
    }
}

/// Registry kept in memory only, for dry runs and tests.
#[derive(Default)]
pub struct InMemorySeenRegistry {
    ids: Mutex<Vec<String>>,
}

impl InMemorySeenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }

    /// Ids in the order they were appended.
    pub fn appended(&self) -> Vec<String> {
        self.ids.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SeenRegistry for InMemorySeenRegistry {
    async fn load(&self) -> Result<SeenSet> {
        let ids = self
            .ids
            .lock()
            .map_err(|e| HarvestError::StorageError(format!("Seen registry poisoned: {}", e)))?;
        Ok(ids.iter().cloned().collect())
    }

    async fn append(&self, id: &str) -> Result<()> {
        let mut ids = self
            .ids
            .lock()
            .map_err(|e| HarvestError::StorageError(format!("Seen registry poisoned: {}", e)))?;
        ids.push(id.to_string());
        Ok(())
    }
}
