//! Persistence contract for handle records, plus an in-memory implementation.

use crate::error::{HandleError, Result};
use crate::resource::{ResourceRef, ResourceType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A stored handle.
///
/// `resource_type` survives an unbind so a later rebind can be type-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    /// Storage key, unrelated to the handle suffix.
    pub id: u64,
    /// Full handle text, `prefix/suffix`. Empty until the record is named.
    pub handle: String,
    /// The bound resource. `None` for a fresh record or a tombstone.
    pub resource: Option<ResourceRef>,
    /// Type of the last bound resource.
    pub resource_type: Option<ResourceType>,
}

impl HandleRecord {
    /// Bound to a live resource with a type tag.
    pub fn is_bound(&self) -> bool {
        self.resource.is_some() && self.resource_type.is_some()
    }

    /// Previously bound, binding cleared, type tag retained.
    pub fn is_tombstoned(&self) -> bool {
        self.resource.is_none() && self.resource_type.is_some()
    }

    pub fn bind(&mut self, resource: ResourceRef) {
        self.resource_type = Some(resource.resource_type);
        self.resource = Some(resource);
    }

    pub fn unbind(&mut self) {
        self.resource = None;
    }
}

/// Backing store for handle records.
///
/// Every method may fail with [`HandleError::Store`]. `next_suffix` must be
/// atomic across concurrent callers; gaps are acceptable, repeats are not.
pub trait HandleStore: Send + Sync {
    /// Allocates a new, empty record with a fresh storage key.
    fn create_record(&self) -> Result<HandleRecord>;

    /// Inserts or replaces the record with the same storage key.
    fn save_record(&self, record: &HandleRecord) -> Result<()>;

    fn find_by_handle(&self, handle: &str) -> Result<Option<HandleRecord>>;

    fn find_by_prefix(&self, prefix: &str) -> Result<Vec<HandleRecord>>;

    fn next_suffix(&self) -> Result<u64>;

    fn count_by_prefix(&self, prefix: &str) -> Result<u64>;

    fn count_total(&self) -> Result<u64>;

    /// Rewrites `old/x` to `new/x` for every stored handle, returning how many changed.
    fn update_prefix(&self, new_prefix: &str, old_prefix: &str) -> Result<usize>;
}

impl<S: HandleStore + ?Sized> HandleStore for Arc<S> {
    fn create_record(&self) -> Result<HandleRecord> {
        (**self).create_record()
    }

    fn save_record(&self, record: &HandleRecord) -> Result<()> {
        (**self).save_record(record)
    }

    fn find_by_handle(&self, handle: &str) -> Result<Option<HandleRecord>> {
        (**self).find_by_handle(handle)
    }

    fn find_by_prefix(&self, prefix: &str) -> Result<Vec<HandleRecord>> {
        (**self).find_by_prefix(prefix)
    }

    fn next_suffix(&self) -> Result<u64> {
        (**self).next_suffix()
    }

    fn count_by_prefix(&self, prefix: &str) -> Result<u64> {
        (**self).count_by_prefix(prefix)
    }

    fn count_total(&self) -> Result<u64> {
        (**self).count_total()
    }

    fn update_prefix(&self, new_prefix: &str, old_prefix: &str) -> Result<usize> {
        (**self).update_prefix(new_prefix, old_prefix)
    }
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<u64, HandleRecord>,
    by_handle: HashMap<String, u64>,
}

/// Thread-safe in-memory [`HandleStore`].
#[derive(Debug)]
pub struct MemoryHandleStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    suffix_sequence: AtomicU64,
    offline: AtomicBool,
}

impl MemoryHandleStore {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Starts the suffix sequence at `first_suffix`.
    pub fn starting_at(first_suffix: u64) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicU64::new(1),
            suffix_sequence: AtomicU64::new(first_suffix),
            offline: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail with [`HandleError::Store`] until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(HandleError::Store("handle store is unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryHandleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn under_prefix(handle: &str, prefix: &str) -> bool {
    handle
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

impl HandleStore for MemoryHandleStore {
    fn create_record(&self) -> Result<HandleRecord> {
        self.check_online()?;
        Ok(HandleRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            handle: String::new(),
            resource: None,
            resource_type: None,
        })
    }

    fn save_record(&self, record: &HandleRecord) -> Result<()> {
        self.check_online()?;
        if record.handle.is_empty() {
            return Err(HandleError::Store(format!(
                "record {} has no handle",
                record.id
            )));
        }
        let mut tables = self.tables.write();
        if let Some(owner) = tables.by_handle.get(&record.handle) {
            if *owner != record.id {
                return Err(HandleError::Store(format!(
                    "duplicate handle {}",
                    record.handle
                )));
            }
        }
        if let Some(previous) = tables.records.get(&record.id) {
            if previous.handle != record.handle {
                let stale = previous.handle.clone();
                tables.by_handle.remove(&stale);
            }
        }
        tables.by_handle.insert(record.handle.clone(), record.id);
        tables.records.insert(record.id, record.clone());
        trace!(id = record.id, handle = %record.handle, "saved handle record");
        Ok(())
    }

    fn find_by_handle(&self, handle: &str) -> Result<Option<HandleRecord>> {
        self.check_online()?;
        let tables = self.tables.read();
        Ok(tables
            .by_handle
            .get(handle)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    fn find_by_prefix(&self, prefix: &str) -> Result<Vec<HandleRecord>> {
        self.check_online()?;
        let tables = self.tables.read();
        let mut found: Vec<HandleRecord> = tables
            .records
            .values()
            .filter(|r| under_prefix(&r.handle, prefix))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    fn next_suffix(&self) -> Result<u64> {
        self.check_online()?;
        Ok(self.suffix_sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn count_by_prefix(&self, prefix: &str) -> Result<u64> {
        self.check_online()?;
        let tables = self.tables.read();
        Ok(tables
            .records
            .values()
            .filter(|r| under_prefix(&r.handle, prefix))
            .count() as u64)
    }

    fn count_total(&self) -> Result<u64> {
        self.check_online()?;
        Ok(self.tables.read().records.len() as u64)
    }

    fn update_prefix(&self, new_prefix: &str, old_prefix: &str) -> Result<usize> {
        self.check_online()?;
        let mut tables = self.tables.write();
        let renames: Vec<(u64, String, String)> = tables
            .records
            .values()
            .filter(|r| under_prefix(&r.handle, old_prefix))
            .map(|r| {
                let renamed = format!("{new_prefix}{}", &r.handle[old_prefix.len()..]);
                (r.id, r.handle.clone(), renamed)
            })
            .collect();
        if let Some((_, _, clash)) = renames
            .iter()
            .find(|(_, _, renamed)| tables.by_handle.contains_key(renamed))
        {
            return Err(HandleError::Store(format!("duplicate handle {clash}")));
        }
        for (id, old, renamed) in &renames {
            tables.by_handle.remove(old);
            tables.by_handle.insert(renamed.clone(), *id);
            if let Some(record) = tables.records.get_mut(id) {
                record.handle.clone_from(renamed);
            }
        }
        Ok(renames.len())
    }
}
