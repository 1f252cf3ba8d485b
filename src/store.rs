//! Result and stash storage
//!
//! The result store persists completed rasters as PNG files keyed by job id;
//! re-encoding through the `image` crate drops embedded color-profile and
//! EXIF metadata, which some viewers mishandle on files with partial
//! transparency. The stash store holds client-pre-encoded blobs in memory so
//! browsers can trigger a native download for bytes they produced locally.

use crate::error::{CutoutError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Process-lifetime storage of completed output rasters, keyed by job id
#[derive(Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open a result store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    /// Returns an IO error when the directory cannot be created.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the result file for a job
    #[must_use]
    pub fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.dir.join(format!("{job_id}.png"))
    }

    /// Persist PNG-encoded result bytes for a job
    ///
    /// Written once per job; results are immutable thereafter.
    ///
    /// # Errors
    /// Returns an IO error when the file cannot be written.
    pub fn save(&self, job_id: Uuid, png_bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(job_id);
        std::fs::write(&path, png_bytes)?;
        Ok(path)
    }

    /// Load the persisted result bytes for a job
    ///
    /// # Errors
    /// Returns `CutoutError::NotFound` when no result exists for the id.
    pub fn load(&self, job_id: Uuid) -> Result<Vec<u8>> {
        let path = self.path_for(job_id);
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CutoutError::not_found(format!("no result for job {job_id}"))
            } else {
                CutoutError::Io(e)
            }
        })
    }
}

/// One stashed blob
#[derive(Debug, Clone)]
pub struct StashEntry {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral in-memory holding area for client-pre-encoded blobs
///
/// Entries accumulate for the process lifetime; there is no eviction policy.
#[derive(Clone, Default)]
pub struct StashStore {
    entries: Arc<DashMap<Uuid, StashEntry>>,
}

impl StashStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes verbatim, returning a fresh stash id
    ///
    /// No content validation: the blob is opaque to the server.
    pub fn stash(&self, bytes: Vec<u8>, filename: String) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            StashEntry {
                bytes,
                filename,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Fetch a stashed blob; the same id may be fetched repeatedly
    #[must_use]
    pub fn fetch(&self, id: Uuid) -> Option<StashEntry> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of stashed entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
