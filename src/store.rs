//! Persisted metrics collection with an in-memory cache
//!
//! The store validates on every load and save and owns the only cached copy of
//! the collection. Persistence itself sits behind the [`Persistence`] port.

use crate::error::AppError;
use crate::metrics::{DataType, Level, Metric, MetricsFile};
use fs2::FileExt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Raw byte storage for the serialized collection
pub trait Persistence {
    /// Read the stored bytes, `None` when nothing has been written yet
    fn read(&self) -> Result<Option<Vec<u8>>, AppError>;
    /// Replace the stored bytes
    fn write(&self, bytes: &[u8]) -> Result<(), AppError>;
    fn exists(&self) -> bool;
    /// Human-readable location, for logs and error messages
    fn describe(&self) -> String;
}

/// JSON file on disk, replaced atomically via a temp file and rename
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Persistence for FilePersistence {
    fn read(&self) -> Result<Option<Vec<u8>>, AppError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        debug!("Read {}: {} bytes", self.path.display(), data.len());
        Ok(Some(data))
    }

    fn write(&self, bytes: &[u8]) -> Result<(), AppError> {
        // Ensure directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!("Created data directory: {}", parent.display());
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        // The lock file is never removed, so every writer locks the same inode
        let lock_file = fs::File::create(self.path.with_extension("lock"))?;
        lock_file.lock_exclusive()?;

        let result = fs::write(&tmp_path, bytes).and_then(|_| fs::rename(&tmp_path, &self.path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }

        let unlocked = FileExt::unlock(&lock_file);
        result?;
        unlocked?;

        debug!("Wrote {}: {} bytes", self.path.display(), bytes.len());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Validated, cached access to the persisted collection
pub struct MetricsStore {
    persistence: Box<dyn Persistence>,
    cached: Option<MetricsFile>,
}

impl MetricsStore {
    pub fn new(persistence: Box<dyn Persistence>) -> Self {
        Self {
            persistence,
            cached: None,
        }
    }

    /// Whether a persisted collection is present
    pub fn exists(&self) -> bool {
        self.persistence.exists()
    }

    pub fn location(&self) -> String {
        self.persistence.describe()
    }

    /// Return the cached collection, reading and validating it on first use
    pub fn load(&mut self) -> Result<&MetricsFile, AppError> {
        if self.cached.is_none() {
            let file = self.read_validated()?;
            info!("Loaded {} metrics from {}", file.metrics.len(), self.location());
            self.cached = Some(file);
        }
        self.cached
            .as_ref()
            .ok_or_else(|| AppError::Internal("metrics cache empty after load".to_string()))
    }

    fn read_validated(&self) -> Result<MetricsFile, AppError> {
        let bytes = self.persistence.read()?.ok_or_else(|| {
            AppError::InvalidData(format!("Metrics file not found at {}", self.location()))
        })?;
        let file: MetricsFile = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InvalidData(format!("Invalid metrics file: {}", e)))?;

        let total = file.metrics.len();
        let file = file.validated()?;
        if file.metrics.len() != total {
            warn!(
                "Dropped {} duplicate metric names while loading (last occurrence kept)",
                total - file.metrics.len()
            );
        }
        Ok(file)
    }

    /// Validate and persist a collection, then make it the cached snapshot
    pub fn save(&mut self, file: MetricsFile) -> Result<(), AppError> {
        let total = file.metrics.len();
        let file = file.validated()?;
        if file.metrics.len() != total {
            warn!(
                "Dropped {} duplicate metric names before saving (last occurrence kept)",
                total - file.metrics.len()
            );
        }

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AppError::Internal(format!("Failed to serialize metrics: {}", e)))?;
        self.persistence.write(json.as_bytes())?;

        info!("Saved {} metrics to {}", file.metrics.len(), self.location());
        self.cached = Some(file);
        Ok(())
    }

    /// Drop the cache so the next read goes back to persistence
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn all(&mut self) -> Result<&[Metric], AppError> {
        Ok(&self.load()?.metrics)
    }

    pub fn get(&mut self, name: &str) -> Result<Option<Metric>, AppError> {
        Ok(self.load()?.metrics.iter().find(|m| m.name == name).cloned())
    }

    pub fn filter_by_level(&mut self, level: Level) -> Result<Vec<Metric>, AppError> {
        self.filter(|m| m.level == level)
    }

    pub fn filter_by_data_type(&mut self, data_type: DataType) -> Result<Vec<Metric>, AppError> {
        self.filter(|m| m.data_type == data_type)
    }

    pub fn filter_by_deprecated(&mut self, deprecated: bool) -> Result<Vec<Metric>, AppError> {
        self.filter(|m| m.deprecated == deprecated)
    }

    fn filter<F>(&mut self, predicate: F) -> Result<Vec<Metric>, AppError>
    where
        F: Fn(&Metric) -> bool,
    {
        Ok(self.load()?.metrics.iter().filter(|m| predicate(m)).cloned().collect())
    }
}
