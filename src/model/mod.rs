//! Data model of an alignment job.
//!
//! Every record carries an integer `id` and an immutable `created`
//! timestamp. `created` is what recognizes the same logical record across
//! two snapshots; the `id` may be reused.

pub mod job;
pub mod logic_tree;
pub mod methods;
pub mod records;
pub mod review;
pub mod status;
pub mod timestamp;

pub use job::{Job, JobMetadata, JobSpecs, JobUpdate, JobUpdateData, ListKind};
pub use logic_tree::{ConditionsKey, ElementsKey, LogicGroup, LogicTree, NoParams};
pub use methods::Methods;
pub use records::{
    empty_filter, DatasetKind, DatasetRef, EntityTypeSelection, Filter, FilterCondition, LensElements,
    LensParams, LensSpec, LinksetSpec, MatchingMethodSpec, MatchingMethods, SpecRef, SpecType, View,
    ViewFilter, ViewProperty,
};
pub use timestamp::Timestamp;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Process-unique positive integer id of a record within its list
pub type SpecId = i64;

/// A path through the properties of an entity type
pub type PropertyPath = Vec<String>;

/// A record of one of the four job lists
pub trait Record: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// What identifies the record within its list
    type Key: Copy + Eq + Hash + Debug + Send + Sync;

    const LIST: ListKind;

    fn key(&self) -> Self::Key;
    fn created(&self) -> &Timestamp;
}

/// Records keyed by their id alone, with store-generated ids and labels
pub trait SpecRecord: Record<Key = SpecId> {
    /// Noun used in generated labels, e.g. `Linkset`
    const NOUN: &'static str;

    /// A fresh default record; `count` is the current list length
    fn scaffold(id: SpecId, created: Timestamp, count: usize) -> Self;

    fn id(&self) -> SpecId {
        self.key()
    }

    /// Give a copy its own identity and a `Duplicated ...` label
    fn reidentify(&mut self, id: SpecId, created: Timestamp, count: usize);
}

impl Record for EntityTypeSelection {
    type Key = SpecId;
    const LIST: ListKind = ListKind::EntityTypeSelections;

    fn key(&self) -> SpecId {
        self.id
    }

    fn created(&self) -> &Timestamp {
        &self.created
    }
}

impl SpecRecord for EntityTypeSelection {
    const NOUN: &'static str = "Data Selection";

    fn scaffold(id: SpecId, created: Timestamp, count: usize) -> Self {
        Self {
            id,
            created,
            label: format!("New {} {}", Self::NOUN, count + 1),
            description: String::new(),
            dataset: None,
            filter: empty_filter(),
            limit: -1,
            random: false,
            properties: vec![vec![String::new()]],
        }
    }

    fn reidentify(&mut self, id: SpecId, created: Timestamp, count: usize) {
        self.id = id;
        self.created = created;
        self.label = format!("Duplicated {} {}", Self::NOUN, count + 1);
    }
}

impl Record for LinksetSpec {
    type Key = SpecId;
    const LIST: ListKind = ListKind::LinksetSpecs;

    fn key(&self) -> SpecId {
        self.id
    }

    fn created(&self) -> &Timestamp {
        &self.created
    }
}

impl SpecRecord for LinksetSpec {
    const NOUN: &'static str = "Linkset";

    fn scaffold(id: SpecId, created: Timestamp, count: usize) -> Self {
        Self {
            id,
            created,
            label: format!("{} {}", Self::NOUN, count + 1),
            description: String::new(),
            use_counter: true,
            sources: Vec::new(),
            targets: Vec::new(),
            methods: MatchingMethods::empty("and"),
        }
    }

    fn reidentify(&mut self, id: SpecId, created: Timestamp, count: usize) {
        self.id = id;
        self.created = created;
        self.label = format!("Duplicated {} {}", Self::NOUN, count + 1);
    }
}

impl Record for LensSpec {
    type Key = SpecId;
    const LIST: ListKind = ListKind::LensSpecs;

    fn key(&self) -> SpecId {
        self.id
    }

    fn created(&self) -> &Timestamp {
        &self.created
    }
}

impl SpecRecord for LensSpec {
    const NOUN: &'static str = "Lens";

    fn scaffold(id: SpecId, created: Timestamp, count: usize) -> Self {
        Self {
            id,
            created,
            label: format!("{} {}", Self::NOUN, count + 1),
            description: String::new(),
            specs: LensElements::empty("union"),
        }
    }

    fn reidentify(&mut self, id: SpecId, created: Timestamp, count: usize) {
        self.id = id;
        self.created = created;
        self.label = format!("Duplicated {} {}", Self::NOUN, count + 1);
    }
}

impl Record for View {
    type Key = (SpecId, SpecType);
    const LIST: ListKind = ListKind::Views;

    fn key(&self) -> (SpecId, SpecType) {
        (self.id, self.kind)
    }

    fn created(&self) -> &Timestamp {
        &self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffolds_follow_default_shapes() {
        let ets = EntityTypeSelection::scaffold(1, Timestamp::new("t0"), 0);
        assert_eq!(ets.label, "New Data Selection 1");
        assert_eq!(ets.limit, -1);
        assert_eq!(ets.properties, vec![vec![String::new()]]);
        assert!(ets.dataset.is_none());

        let linkset = LinksetSpec::scaffold(3, Timestamp::new("t0"), 2);
        assert_eq!(linkset.label, "Linkset 3");
        assert!(linkset.use_counter);
        assert_eq!(
            serde_json::to_value(&linkset.methods).unwrap(),
            serde_json::json!({"type": "and", "conditions": []})
        );

        let mut lens = LensSpec::scaffold(1, Timestamp::new("t0"), 0);
        assert_eq!(
            serde_json::to_value(&lens.specs).unwrap(),
            serde_json::json!({"type": "union", "elements": []})
        );
        lens.reidentify(2, Timestamp::new("t1"), 1);
        assert_eq!(lens.label, "Duplicated Lens 2");
        assert_eq!(lens.id(), 2);
    }

    #[test]
    fn views_are_keyed_by_id_and_type() {
        let linkset_view = View::empty(1, SpecType::Linkset);
        let lens_view = View::empty(1, SpecType::Lens);
        assert_ne!(linkset_view.key(), lens_view.key());
    }
}
