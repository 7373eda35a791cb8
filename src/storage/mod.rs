//! Content-addressable record store
//!
//! One JSON document per fingerprint, named `<fingerprint>.json`, directly
//! under the store directory.

mod format;
mod reader;
mod writer;

pub use format::{
    status_allows_body, Body, HeaderMultiMap, ResponseRecord, RECORD_EXTENSION,
};

use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;
use crate::{ChameleonError, Result};

/// Directory-backed store of response records keyed by fingerprint
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open a store, creating its directory if absent
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ChameleonError::Other(format!(
                "failed to create storage directory {}: {e}",
                dir.display()
            ))
        })?;

        Ok(Self { dir })
    }

    /// Store directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the record for `fingerprint`
    #[must_use]
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", fingerprint.to_hex()))
    }
}
