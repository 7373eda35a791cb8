//! Record persistence

use std::io::Write;

use tempfile::NamedTempFile;
use tracing::debug;

use super::{RecordStore, ResponseRecord};
use crate::fingerprint::Fingerprint;
use crate::{ChameleonError, Result};

impl RecordStore {
    /// Persist `record` under `fingerprint`, replacing any previous record
    ///
    /// The document is written to a temporary file in the store directory
    /// and renamed over the target, so readers see either the old record or
    /// the new one in full.
    ///
    /// # Errors
    ///
    /// Returns [`ChameleonError::StorageWrite`] on any filesystem failure
    pub fn save(&self, fingerprint: &Fingerprint, record: &ResponseRecord) -> Result<()> {
        let path = self.path_for(fingerprint);
        let storage_error = |source: std::io::Error| ChameleonError::StorageWrite {
            path: path.clone(),
            source,
        };

        let data = record
            .to_json()
            .map_err(|e| storage_error(std::io::Error::other(e)))?;

        let mut file = NamedTempFile::new_in(self.dir()).map_err(storage_error)?;
        file.write_all(&data).map_err(storage_error)?;
        file.as_file().sync_all().map_err(storage_error)?;
        file.persist(&path).map_err(|e| storage_error(e.error))?;

        debug!(
            "Saved record {} ({} bytes)",
            fingerprint.short(),
            data.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_request;
    use crate::storage::{Body, HeaderMultiMap};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(status_code: u16, body: &[u8]) -> ResponseRecord {
        let mut headers = HeaderMultiMap::new();
        headers.insert(
            "content-type".to_string(),
            vec!["application/json".to_string()],
        );
        ResponseRecord {
            method: "POST".to_string(),
            path: "/api/users".to_string(),
            status_code,
            headers,
            body: Body::from_bytes(body),
        }
    }

    #[test]
    fn test_store_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("records");

        let store = RecordStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn test_save_and_load_json_body() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path()).unwrap();
        let fingerprint = fingerprint_request("POST", "/api/users", br#"{"name":"John"}"#);

        store
            .save(&fingerprint, &record(200, br#"{"name":"John"}"#))
            .unwrap();

        let file = std::fs::read(store.path_for(&fingerprint)).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&file).unwrap();
        assert_eq!(doc["body"], json!({"name": "John"}));
        assert_eq!(doc["status_code"], json!(200));
        assert_eq!(doc["headers"]["content-type"], json!(["application/json"]));

        let loaded = store.load(&fingerprint).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&loaded.body.to_bytes()).unwrap();
        assert_eq!(body, json!({"name": "John"}));
    }

    #[test]
    fn test_save_and_load_binary_body() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path()).unwrap();
        let fingerprint = fingerprint_request("GET", "/image.png", b"");
        let bytes = vec![0x89, b'P', b'N', b'G', 0x00, 0x00, 0xff, 0x0d, 0x0a];

        store.save(&fingerprint, &record(200, &bytes)).unwrap();

        assert_eq!(store.load(&fingerprint).unwrap().body.to_bytes(), bytes);
    }

    #[test]
    fn test_save_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path()).unwrap();
        let fingerprint = fingerprint_request("GET", "/api", b"");

        store.save(&fingerprint, &record(200, b"first")).unwrap();
        store.save(&fingerprint, &record(201, b"second")).unwrap();

        let loaded = store.load(&fingerprint).unwrap();
        assert_eq!(loaded.status_code, 201);
        assert_eq!(loaded.body.to_bytes(), b"second".to_vec());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_save_into_removed_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("gone");
        let store = RecordStore::open(&dir).unwrap();
        std::fs::remove_dir(&dir).unwrap();

        let result = store.save(&fingerprint_request("GET", "/", b""), &record(200, b""));
        assert!(matches!(result, Err(ChameleonError::StorageWrite { .. })));
    }
}
