//! Record lookup

use std::io::ErrorKind;

use tracing::debug;

use super::{RecordStore, ResponseRecord, RECORD_EXTENSION};
use crate::fingerprint::{Fingerprint, FINGERPRINT_HEX_LEN};
use crate::{ChameleonError, Result};

impl RecordStore {
    /// Whether a record is stored under `fingerprint`
    #[must_use]
    pub fn exists(&self, fingerprint: &Fingerprint) -> bool {
        self.path_for(fingerprint).is_file()
    }

    /// Load the record stored under `fingerprint`
    ///
    /// # Errors
    ///
    /// Returns [`ChameleonError::RecordingNotFound`] if nothing is stored
    /// under the key and [`ChameleonError::CorruptRecord`] if the stored
    /// bytes do not decode
    pub fn load(&self, fingerprint: &Fingerprint) -> Result<ResponseRecord> {
        let path = self.path_for(fingerprint);

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ChameleonError::RecordingNotFound(fingerprint.to_hex()));
            }
            Err(e) => {
                return Err(ChameleonError::CorruptRecord {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let record = ResponseRecord::from_json(&data).map_err(|e| ChameleonError::CorruptRecord {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!(
            "Loaded record {} ({} bytes)",
            fingerprint.short(),
            data.len()
        );

        Ok(record)
    }

    /// Fingerprints of all stored records, sorted
    ///
    /// Files that are not named `<64 hex chars>.json` are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the store directory cannot be read
    pub fn list(&self) -> Result<Vec<Fingerprint>> {
        let mut fingerprints = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            if stem.len() != FINGERPRINT_HEX_LEN {
                continue;
            }

            if let Ok(fingerprint) = stem.parse::<Fingerprint>() {
                fingerprints.push(fingerprint);
            }
        }

        fingerprints.sort();
        Ok(fingerprints)
    }
}
