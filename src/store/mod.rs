//! In-memory stores holding the working copy of an open job.
//!
//! Each store keeps an ordered list of records behind an `Arc`. Every
//! mutation builds a new list, so a snapshot taken with [`SpecStore::list`]
//! never changes underneath its holder.

mod job_stores;
mod views;

pub use job_stores::JobStores;
pub use views::ViewsUpdate;

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::identity;
use crate::model::{Record, SpecId, SpecRecord, Timestamp};

/// Errors raised by store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No record {key} in {list}")]
    NotFound { list: &'static str, key: String },
}

impl StoreError {
    fn not_found<T: Record>(key: T::Key) -> Self {
        StoreError::NotFound {
            list: T::LIST.field(),
            key: format!("{:?}", key),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Ordered, copy-on-write list of records of one kind
#[derive(Debug, Clone)]
pub struct SpecStore<T> {
    records: Arc<Vec<T>>,
}

impl<T> Default for SpecStore<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(Vec::new()),
        }
    }
}

impl<T: Record> SpecStore<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    /// Snapshot of the current list
    pub fn list(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.records)
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: T::Key) -> Option<&T> {
        self.records.iter().find(|record| record.key() == key)
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.get(key).is_some()
    }

    /// Replace the record at `key` with a mutated copy
    pub fn update<F>(&mut self, key: T::Key, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut T),
    {
        let records = identity::update_by_key(&self.records, key, mutate).ok_or_else(|| StoreError::not_found::<T>(key))?;
        self.records = Arc::new(records);
        Ok(())
    }

    pub fn delete(&mut self, key: T::Key) -> StoreResult<()> {
        if !self.contains(key) {
            return Err(StoreError::not_found::<T>(key));
        }
        self.records = Arc::new(identity::remove_by_key(&self.records, key));
        debug!("Deleted {:?} from {}", key, T::LIST.field());
        Ok(())
    }

    pub(crate) fn prepend(&mut self, record: T) {
        let mut records = Vec::with_capacity(self.records.len() + 1);
        records.push(record);
        records.extend_from_slice(&self.records);
        self.records = Arc::new(records);
    }

    pub(crate) fn duplicate_with<F>(&mut self, key: T::Key, reidentify: F) -> StoreResult<()>
    where
        F: FnOnce(&mut T),
    {
        let records =
            identity::duplicate_after(&self.records, key, reidentify).ok_or_else(|| StoreError::not_found::<T>(key))?;
        self.records = Arc::new(records);
        Ok(())
    }

    /// Install a whole list as-is. Reserved for the sync engine.
    pub(crate) fn replace_all(&mut self, records: Vec<T>) {
        self.records = Arc::new(records);
    }
}

impl<T: SpecRecord> SpecStore<T> {
    /// Prepend a default record with the next free id and return that id
    pub fn add_new(&mut self) -> SpecId {
        let id = identity::next_id(&self.records);
        let record = T::scaffold(id, Timestamp::now(), self.records.len());
        self.prepend(record);
        debug!("Added {} {} to {}", T::NOUN, id, T::LIST.field());
        id
    }

    /// Insert a copy of record `id` right after it, under a new id and
    /// creation time. Returns the new id.
    pub fn duplicate_by_id(&mut self, id: SpecId) -> StoreResult<SpecId> {
        let new_id = identity::next_id(&self.records);
        let count = self.records.len();
        self.duplicate_with(id, |copy| copy.reidentify(new_id, Timestamp::now(), count))?;
        debug!("Duplicated {} {} as {}", T::NOUN, id, new_id);
        Ok(new_id)
    }

    pub fn delete_by_id(&mut self, id: SpecId) -> StoreResult<()> {
        self.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityTypeSelection, LinksetSpec};

    fn store_with(ids: &[SpecId]) -> SpecStore<LinksetSpec> {
        SpecStore::new(
            ids.iter()
                .map(|&id| LinksetSpec::scaffold(id, Timestamp::new(format!("t{}", id)), 0))
                .collect(),
        )
    }

    #[test]
    fn add_new_prepends_next_id() {
        let mut store = store_with(&[1]);
        let id = store.add_new();

        assert_eq!(id, 2);
        let ids: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.records()[1].created, Timestamp::new("t1"));
        assert!(store.records().iter().skip(1).all(|r| r.id < id));

        let mut empty = SpecStore::<EntityTypeSelection>::default();
        assert_eq!(empty.add_new(), 1);
    }

    #[test]
    fn update_is_copy_on_write() {
        let mut store = store_with(&[1, 2]);
        let before = store.list();

        store.update(1, |spec| spec.sources.push(9)).unwrap();

        assert!(before[0].sources.is_empty());
        assert_eq!(store.get(1).unwrap().sources, vec![9]);
        assert!(!Arc::ptr_eq(&before, &store.list()));
    }

    #[test]
    fn duplicate_gets_new_identity_next_to_source() {
        let mut store = store_with(&[1, 2]);
        store.update(1, |spec| spec.targets = vec![3]).unwrap();

        let new_id = store.duplicate_by_id(1).unwrap();
        let records = store.records();

        assert_eq!(new_id, 3);
        assert_eq!(records[1].id, 3);
        assert_ne!(records[1].created, records[0].created);
        assert_eq!(records[1].targets, records[0].targets);
        assert_eq!(records[1].label, "Duplicated Linkset 3");
    }

    #[test]
    fn missing_ids_are_reported_and_leave_list_intact() {
        let mut store = store_with(&[1]);
        assert!(store.update(5, |_| {}).is_err());
        assert!(store.duplicate_by_id(5).is_err());
        assert!(store.delete_by_id(5).is_err());
        assert_eq!(store.len(), 1);
    }
}
