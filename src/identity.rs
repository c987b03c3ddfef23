//! Id allocation and copy-on-write list helpers shared by the stores.

use crate::model::{Record, SpecId, SpecRecord};

/// `1 + max(existing ids)`, or `1` for an empty list
pub fn next_id<T: SpecRecord>(records: &[T]) -> SpecId {
    records.iter().map(|record| record.id()).fold(0, SpecId::max) + 1
}

pub fn position<T: Record>(records: &[T], key: T::Key) -> Option<usize> {
    records.iter().position(|record| record.key() == key)
}

/// A new list with a copy of the record at `key` inserted right after it.
///
/// `reidentify` is applied to the copy before insertion; the source record
/// is left as it is. Returns `None` when no record has `key`.
pub fn duplicate_after<T, F>(records: &[T], key: T::Key, reidentify: F) -> Option<Vec<T>>
where
    T: Record,
    F: FnOnce(&mut T),
{
    let index = position(records, key)?;
    let mut copy = records[index].clone();
    reidentify(&mut copy);

    let mut out = Vec::with_capacity(records.len() + 1);
    out.extend_from_slice(&records[..=index]);
    out.push(copy);
    out.extend_from_slice(&records[index + 1..]);
    Some(out)
}

/// A new list where the record at `key` is replaced by a mutated copy.
///
/// Returns `None` when no record has `key`.
pub fn update_by_key<T, F>(records: &[T], key: T::Key, mutate: F) -> Option<Vec<T>>
where
    T: Record,
    F: FnOnce(&mut T),
{
    let index = position(records, key)?;
    let mut out = records.to_vec();
    mutate(&mut out[index]);
    Some(out)
}

/// A new list without the record at `key`
pub fn remove_by_key<T: Record>(records: &[T], key: T::Key) -> Vec<T> {
    records
        .iter()
        .filter(|record| record.key() != key)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LensSpec, Timestamp};

    fn lenses(ids: &[SpecId]) -> Vec<LensSpec> {
        ids.iter()
            .map(|&id| LensSpec::scaffold(id, Timestamp::new(format!("t{}", id)), 0))
            .collect()
    }

    #[test]
    fn next_id_is_one_past_the_maximum() {
        assert_eq!(next_id::<LensSpec>(&[]), 1);
        assert_eq!(next_id(&lenses(&[3, 1, 7])), 8);
    }

    #[test]
    fn duplicate_lands_after_source() {
        let list = lenses(&[1, 2, 3]);
        let out = duplicate_after(&list, 2, |copy| copy.reidentify(9, Timestamp::new("t9"), 3)).unwrap();
        let ids: Vec<_> = out.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2, 9, 3]);
        assert!(duplicate_after(&list, 42, |_| {}).is_none());
    }

    #[test]
    fn update_leaves_source_list_untouched() {
        let list = lenses(&[1, 2]);
        let out = update_by_key(&list, 1, |lens| lens.label = "changed".into()).unwrap();
        assert_eq!(out[0].label, "changed");
        assert_eq!(list[0].label, "Lens 1");
        assert!(update_by_key(&list, 5, |_| {}).is_none());
        assert_eq!(remove_by_key(&list, 1).len(), 1);
    }
}
