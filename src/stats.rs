//! Read-only summary of a record store

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::storage::{Body, RecordStore};
use crate::Result;

/// Counts over every record in a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records that decoded
    pub records: usize,
    /// Records that failed to decode
    pub unreadable: usize,
    /// Records per request method
    pub by_method: BTreeMap<String, usize>,
    /// Records per status code
    pub by_status: BTreeMap<u16, usize>,
    /// Records whose body is stored as nested JSON
    pub structured_bodies: usize,
    /// Total body bytes across readable records
    pub body_bytes: usize,
}

impl StoreStats {
    /// Load every record in `store` and tally it
    ///
    /// # Errors
    ///
    /// Returns error if the store directory cannot be listed
    pub fn collect(store: &RecordStore) -> Result<Self> {
        let mut stats = Self::default();

        for fingerprint in store.list()? {
            let record = match store.load(&fingerprint) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping {}: {}", fingerprint.short(), e);
                    stats.unreadable += 1;
                    continue;
                }
            };

            stats.records += 1;
            *stats.by_method.entry(record.method.clone()).or_default() += 1;
            *stats.by_status.entry(record.status_code).or_default() += 1;
            if matches!(record.body, Body::Structured(_)) {
                stats.structured_bodies += 1;
            }
            stats.body_bytes += record.body.to_bytes().len();
        }

        Ok(stats)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:     {}", self.records)?;
        writeln!(f, "Unreadable:  {}", self.unreadable)?;
        writeln!(f, "JSON bodies: {}", self.structured_bodies)?;
        writeln!(f, "Body bytes:  {}", self.body_bytes)?;

        if !self.by_method.is_empty() {
            writeln!(f)?;
            writeln!(f, "By method:")?;
            for (method, count) in &self.by_method {
                writeln!(f, "  {method:<8} {count}")?;
            }
        }

        if !self.by_status.is_empty() {
            writeln!(f)?;
            writeln!(f, "By status:")?;
            for (status, count) in &self.by_status {
                writeln!(f, "  {status:<8} {count}")?;
            }
        }

        Ok(())
    }
}
