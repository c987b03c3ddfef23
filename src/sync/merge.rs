//! Three-way, record-level merge of one job list.
//!
//! Inputs are the list as last accepted from the server (`original`), as
//! freshly fetched (`saved`) and as currently edited (`unsaved`). Records
//! are matched by key; `created` decides whether two records with the same
//! key are the same logical record. On a genuine conflict the server copy
//! wins and the local edit is discarded without a field-level merge.

use std::collections::HashSet;

use crate::model::Record;

/// How the result of a merge was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Server made no claim and nothing was edited: take the server copy
    Server,
    /// Server made no claim but there are local edits: keep them all
    Local,
    /// Server changed the list: record-by-record reconciliation
    Reconciled,
}

/// Result of merging one list
#[derive(Debug, Clone, PartialEq)]
pub struct Merged<T> {
    pub records: Vec<T>,
    pub mode: MergeMode,
    /// Local records or edits carried into the result
    pub kept_local: usize,
    /// Local records or edits lost to the server copy
    pub discarded_local: usize,
}

impl<T> Merged<T> {
    fn whole(records: Vec<T>, mode: MergeMode) -> Self {
        Self {
            records,
            mode,
            kept_local: 0,
            discarded_local: 0,
        }
    }
}

fn find<T: Record>(records: &[T], key: T::Key) -> Option<&T> {
    records.iter().find(|record| record.key() == key)
}

/// Merge one list.
///
/// `is_update` is the server's per-list change flag and `has_unsaved`
/// whether `unsaved` differs from `original`.
pub fn merge_specs<T: Record>(
    is_update: bool,
    has_unsaved: bool,
    original: &[T],
    saved: &[T],
    unsaved: &[T],
) -> Merged<T> {
    if !is_update && !has_unsaved {
        return Merged::whole(saved.to_vec(), MergeMode::Server);
    }
    if !is_update {
        return Merged::whole(unsaved.to_vec(), MergeMode::Local);
    }

    let mut result = saved.to_vec();
    let mut kept_local = 0;
    let mut discarded_local = 0;

    let mut seen = HashSet::new();
    let keys: Vec<T::Key> = saved
        .iter()
        .chain(unsaved)
        .map(|record| record.key())
        .filter(|key| seen.insert(*key))
        .collect();

    for key in keys {
        let original_record = find(original, key);
        let unsaved_record = find(unsaved, key);
        let saved_record = find(saved, key);

        match (unsaved_record, saved_record) {
            // Gone locally: stays gone if the server still has the same record
            (None, Some(saved_record)) => {
                if original_record.map_or(false, |o| o.created() == saved_record.created()) {
                    result.retain(|record| record.key() != key);
                    kept_local += 1;
                }
            }
            // Gone on the server: keep it only when it never reached the server
            (Some(unsaved_record), None) => {
                if original_record.is_none() {
                    result.push(unsaved_record.clone());
                    kept_local += 1;
                } else if original_record != Some(unsaved_record) {
                    discarded_local += 1;
                }
            }
            (Some(unsaved_record), Some(saved_record)) => {
                if unsaved_record.created() != saved_record.created() {
                    // Two different records under one id: the server copy wins
                    discarded_local += 1;
                    continue;
                }

                let unsaved_changed = original_record.map_or(true, |o| o != unsaved_record);
                let saved_changed = original_record.map_or(true, |o| o != saved_record);

                if unsaved_changed && !saved_changed {
                    if let Some(slot) = result.iter_mut().find(|record| record.key() == key) {
                        *slot = unsaved_record.clone();
                    }
                    kept_local += 1;
                } else if unsaved_changed && unsaved_record != saved_record {
                    discarded_local += 1;
                }
            }
            (None, None) => {}
        }
    }

    Merged {
        records: result,
        mode: MergeMode::Reconciled,
        kept_local,
        discarded_local,
    }
}
