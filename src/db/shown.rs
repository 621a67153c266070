use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use crate::error::AppResult;
use crate::models::ShownEntry;
use crate::services::hours_before;

/// Persistence for the products already recommended to each customer
///
/// Stores are append-only per customer. Entries older than the selection
/// window are ignored by `recent` and can be dropped with `prune`. Callers
/// that need read-then-append atomicity for a customer must serialize it
/// themselves (see `CustomerLocks`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShownStore: Send + Sync {
    /// All entries recorded for a customer, oldest first
    async fn entries(&self, customer_id: &str) -> AppResult<Vec<ShownEntry>>;

    /// Appends an entry to the customer's record
    async fn record(&self, customer_id: &str, entry: ShownEntry) -> AppResult<()>;

    /// Entries shown at or after `since`
    async fn recent(&self, customer_id: &str, since: DateTime<Utc>) -> AppResult<Vec<ShownEntry>> {
        let entries = self.entries(customer_id).await?;
        Ok(entries.into_iter().filter(|e| e.is_active(since)).collect())
    }

    async fn clear_customer(&self, customer_id: &str) -> AppResult<()>;

    async fn clear_all(&self) -> AppResult<()>;

    /// Physically removes entries shown before `before`, returning how many were dropped
    async fn prune(&self, before: DateTime<Utc>) -> AppResult<usize>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

fn prune_records<'a>(
    records: impl Iterator<Item = &'a mut Vec<ShownEntry>>,
    before: DateTime<Utc>,
) -> usize {
    let mut removed = 0;
    for entries in records {
        let len = entries.len();
        entries.retain(|e| e.is_active(before));
        removed += len - entries.len();
    }
    removed
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, used in tests and when persistence is not wanted
#[derive(Default)]
pub struct InMemoryShownStore {
    records: RwLock<HashMap<String, Vec<ShownEntry>>>,
}

impl InMemoryShownStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShownStore for InMemoryShownStore {
    async fn entries(&self, customer_id: &str) -> AppResult<Vec<ShownEntry>> {
        let records = self.records.read().await;
        Ok(records.get(customer_id).cloned().unwrap_or_default())
    }

    async fn record(&self, customer_id: &str, entry: ShownEntry) -> AppResult<()> {
        let mut records = self.records.write().await;
        records.entry(customer_id.to_string()).or_default().push(entry);
        Ok(())
    }

    async fn clear_customer(&self, customer_id: &str) -> AppResult<()> {
        self.records.write().await.remove(customer_id);
        Ok(())
    }

    async fn clear_all(&self) -> AppResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn prune(&self, before: DateTime<Utc>) -> AppResult<usize> {
        let mut records = self.records.write().await;
        let removed = prune_records(records.values_mut(), before);
        records.retain(|_, entries| !entries.is_empty());
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Store backed by a single JSON document mapping customer id to entries
///
/// The file is read once on open and rewritten after every change. With a
/// retention window set, each append also drops the customer's entries that
/// fell out of the window, so a long-running process does not grow the file
/// without bound.
pub struct JsonFileShownStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, Vec<ShownEntry>>>,
    retention_hours: Option<f64>,
}

impl JsonFileShownStore {
    /// Opens the store at `path`
    ///
    /// A missing file starts an empty store. An unreadable or corrupt file is
    /// logged and also starts empty, so recommendations keep flowing; the
    /// file is overwritten on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match Self::read_file(&path).await {
            Ok(Some(records)) => {
                tracing::debug!(path = %path.display(), customers = records.len(), "Loaded shown products");
                records
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "No shown products file found, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not load shown products, starting with empty history");
                BTreeMap::new()
            }
        };

        Self {
            path,
            records: Mutex::new(records),
            retention_hours: None,
        }
    }

    /// Keeps only entries younger than `hours` relative to the newest append
    pub fn with_retention(mut self, hours: f64) -> Self {
        self.retention_hours = Some(hours);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(path: &Path) -> AppResult<Option<BTreeMap<String, Vec<ShownEntry>>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, records: &BTreeMap<String, Vec<ShownEntry>>) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ShownStore for JsonFileShownStore {
    async fn entries(&self, customer_id: &str) -> AppResult<Vec<ShownEntry>> {
        let records = self.records.lock().await;
        Ok(records.get(customer_id).cloned().unwrap_or_default())
    }

    async fn record(&self, customer_id: &str, entry: ShownEntry) -> AppResult<()> {
        let mut records = self.records.lock().await;
        let shown_at = entry.shown_at;
        let entries = records.entry(customer_id.to_string()).or_default();
        entries.push(entry);
        if let Some(hours) = self.retention_hours {
            let cutoff = hours_before(shown_at, hours);
            let before = entries.len();
            entries.retain(|e| e.is_active(cutoff));
            if entries.len() < before {
                tracing::debug!(customer_id = %customer_id, expired = before - entries.len(), "Dropped expired shown products");
            }
        }
        self.persist(&records).await?;
        tracing::debug!(customer_id = %customer_id, "Recorded shown product");
        Ok(())
    }

    async fn clear_customer(&self, customer_id: &str) -> AppResult<()> {
        let mut records = self.records.lock().await;
        if records.remove(customer_id).is_some() {
            self.persist(&records).await?;
            tracing::info!(customer_id = %customer_id, "Cleared shown products");
        }
        Ok(())
    }

    async fn clear_all(&self) -> AppResult<()> {
        let mut records = self.records.lock().await;
        records.clear();
        self.persist(&records).await?;
        tracing::info!("Cleared all shown products");
        Ok(())
    }

    async fn prune(&self, before: DateTime<Utc>) -> AppResult<usize> {
        let mut records = self.records.lock().await;
        let removed = prune_records(records.values_mut(), before);
        records.retain(|_, entries| !entries.is_empty());
        if removed > 0 {
            self.persist(&records).await?;
        }
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_appends_instead_of_overwriting() {
        let store = InMemoryShownStore::new();
        store.record("C001", ShownEntry::new("P001", at(8))).await.unwrap();
        store.record("C001", ShownEntry::new("P001", at(9))).await.unwrap();

        let entries = store.entries("C001").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(store.entries("C002").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_filters_by_window() {
        let store = InMemoryShownStore::new();
        store.record("C001", ShownEntry::new("P001", at(1))).await.unwrap();
        store.record("C001", ShownEntry::new("P002", at(10))).await.unwrap();

        let recent = store.recent("C001", at(5)).await.unwrap();
        assert_eq!(recent, vec![ShownEntry::new("P002", at(10))]);
    }

    #[tokio::test]
    async fn test_in_memory_prune_and_clear() {
        let store = InMemoryShownStore::new();
        store.record("C001", ShownEntry::new("P001", at(1))).await.unwrap();
        store.record("C002", ShownEntry::new("P002", at(10))).await.unwrap();

        assert_eq!(store.prune(at(5)).await.unwrap(), 1);
        assert!(store.entries("C001").await.unwrap().is_empty());

        store.clear_customer("C002").await.unwrap();
        assert!(store.entries("C002").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("shown.json");

        let store = JsonFileShownStore::open(&path).await;
        store.record("C001", ShownEntry::new("P001", at(8))).await.unwrap();
        drop(store);

        let reopened = JsonFileShownStore::open(&path).await;
        let recent = reopened.recent("C001", at(8) - Duration::hours(24)).await.unwrap();
        assert_eq!(recent, vec![ShownEntry::new("P001", at(8))]);
    }

    #[tokio::test]
    async fn test_json_store_drops_expired_entries_on_append() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shown.json");
        let store = JsonFileShownStore::open(&path).await.with_retention(24.0);

        store.record("C001", ShownEntry::new("P001", at(1) - Duration::days(2))).await.unwrap();
        store.record("C002", ShownEntry::new("P009", at(1) - Duration::days(2))).await.unwrap();
        store.record("C001", ShownEntry::new("P002", at(8))).await.unwrap();
        store.record("C001", ShownEntry::new("P003", at(9))).await.unwrap();

        let entries = store.entries("C001").await.unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.product_id.as_str()).collect();
        assert_eq!(ids, vec!["P002", "P003"]);
        // Other customers are only trimmed on their own appends
        assert_eq!(store.entries("C002").await.unwrap().len(), 1);

        let reopened = JsonFileShownStore::open(&path).await;
        assert_eq!(reopened.entries("C001").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_json_store_starts_empty_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shown.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileShownStore::open(&path).await;
        assert!(store.entries("C001").await.unwrap().is_empty());

        store.record("C001", ShownEntry::new("P001", at(8))).await.unwrap();
        let reopened = JsonFileShownStore::open(&path).await;
        assert_eq!(reopened.entries("C001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_store_clear_all_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shown.json");

        let store = JsonFileShownStore::open(&path).await;
        store.record("C001", ShownEntry::new("P001", at(8))).await.unwrap();
        store.record("C002", ShownEntry::new("P002", at(8))).await.unwrap();
        store.clear_all().await.unwrap();

        let reopened = JsonFileShownStore::open(&path).await;
        assert!(reopened.entries("C001").await.unwrap().is_empty());
        assert!(reopened.entries("C002").await.unwrap().is_empty());
    }
}
