//! Sub-specification records of a job: entity-type selections, linkset
//! specs, lens specs and views.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::logic_tree::{ConditionsKey, ElementsKey, LogicTree, NoParams};
use super::timestamp::Timestamp;
use super::{PropertyPath, SpecId};

// ============================================================================
// DATASETS & FILTERS
// ============================================================================

/// Which backend a dataset reference points into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Timbuctoo,
    Sparql,
    Unknown,
}

/// Reference to one physical dataset collection.
///
/// The shape depends on the dataset kind (GraphQL endpoint + dataset id +
/// collection id, or SPARQL endpoint + entity type), so the fields are kept
/// as an object and compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetRef(Map<String, Value>);

impl DatasetRef {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn timbuctoo(
        graphql_endpoint: impl Into<String>,
        dataset_id: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert("timbuctoo_graphql".into(), Value::String(graphql_endpoint.into()));
        fields.insert("dataset_id".into(), Value::String(dataset_id.into()));
        fields.insert("collection_id".into(), Value::String(collection_id.into()));
        Self(fields)
    }

    pub fn sparql(endpoint: impl Into<String>, entity_type_id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("sparql_endpoint".into(), Value::String(endpoint.into()));
        fields.insert("entity_type_id".into(), Value::String(entity_type_id.into()));
        Self(fields)
    }

    pub fn kind(&self) -> DatasetKind {
        if self.0.contains_key("sparql_endpoint") {
            DatasetKind::Sparql
        } else if self.0.contains_key("timbuctoo_graphql") || self.0.contains_key("graphql_endpoint") {
            DatasetKind::Timbuctoo
        } else {
            DatasetKind::Unknown
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn sparql_endpoint(&self) -> Option<&str> {
        self.get_str("sparql_endpoint")
    }

    pub fn graphql_endpoint(&self) -> Option<&str> {
        self.get_str("timbuctoo_graphql")
            .or_else(|| self.get_str("graphql_endpoint"))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            DatasetKind::Sparql => write!(
                f,
                "sparql:{}#{}",
                self.sparql_endpoint().unwrap_or_default(),
                self.get_str("entity_type_id").unwrap_or_default()
            ),
            DatasetKind::Timbuctoo => write!(
                f,
                "timbuctoo:{}/{}/{}",
                self.graphql_endpoint().unwrap_or_default(),
                self.get_str("dataset_id").unwrap_or_default(),
                self.get_str("collection_id").unwrap_or_default()
            ),
            DatasetKind::Unknown => write!(f, "{}", Value::Object(self.0.clone())),
        }
    }
}

/// A property-based filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub property: PropertyPath,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

pub type Filter = LogicTree<FilterCondition, NoParams, ConditionsKey>;

/// The empty filter scaffold: `{type: "and", conditions: []}`
pub fn empty_filter() -> Filter {
    Filter::empty("and")
}

// ============================================================================
// ENTITY TYPE SELECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeSelection {
    pub id: SpecId,
    pub created: Timestamp,
    pub label: String,
    pub description: String,
    pub dataset: Option<DatasetRef>,
    pub filter: Filter,
    /// Row limit, `-1` for all rows
    pub limit: i64,
    pub random: bool,
    pub properties: Vec<PropertyPath>,
}

// ============================================================================
// LINKSET SPECS
// ============================================================================

/// Thresholds stay [`Number`]s so `0` is written back as `0`, not `0.0`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Number>,
}

pub type MatchingMethods = LogicTree<MatchingMethodSpec, MethodParams, ConditionsKey>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMethodConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub normalized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMatching {
    pub threshold: Number,
    pub is_percentage: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fuzzy {
    pub t_norm: String,
    pub s_norm: String,
    pub threshold: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTransformer {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCondition {
    pub property: PropertyPath,
    #[serde(default)]
    pub transformers: Vec<AppliedTransformer>,
}

/// Properties compared on one side of a matching method, per ETS id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SideConditions {
    pub properties: BTreeMap<SpecId, Vec<PropertyCondition>>,
    #[serde(default)]
    pub transformers: Vec<AppliedTransformer>,
}

/// A leaf of the matching-method tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingMethodSpec {
    pub method: MethodConfig,
    pub sim_method: SimMethodConfig,
    pub fuzzy: Fuzzy,
    pub list_matching: ListMatching,
    pub sources: SideConditions,
    pub targets: SideConditions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinksetSpec {
    pub id: SpecId,
    pub created: Timestamp,
    pub label: String,
    pub description: String,
    pub use_counter: bool,
    pub sources: Vec<SpecId>,
    pub targets: Vec<SpecId>,
    pub methods: MatchingMethods,
}

impl LinksetSpec {
    /// `sources ∪ targets`, sorted and without duplicates
    pub fn entity_type_selection_ids(&self) -> Vec<SpecId> {
        let mut ids: Vec<SpecId> = self.sources.iter().chain(&self.targets).copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// ============================================================================
// LENS SPECS
// ============================================================================

/// Which kind of spec a reference or view belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecType {
    Linkset,
    Lens,
}

impl fmt::Display for SpecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecType::Linkset => f.write_str("linkset"),
            SpecType::Lens => f.write_str("lens"),
        }
    }
}

/// Leaf of a lens tree: a reference to a linkset or another lens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecRef {
    pub id: SpecId,
    #[serde(rename = "type")]
    pub kind: SpecType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LensParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_norm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Number>,
}

pub type LensElements = LogicTree<SpecRef, LensParams, ElementsKey>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensSpec {
    pub id: SpecId,
    pub created: Timestamp,
    pub label: String,
    pub description: String,
    pub specs: LensElements,
}

// ============================================================================
// VIEWS
// ============================================================================

/// Property labels shown for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewProperty {
    pub dataset: DatasetRef,
    pub properties: Vec<PropertyPath>,
}

impl ViewProperty {
    pub fn scaffold(dataset: DatasetRef) -> Self {
        Self {
            dataset,
            properties: vec![vec![String::new()]],
        }
    }
}

/// Filter applied to one dataset when reviewing links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFilter {
    pub dataset: DatasetRef,
    pub filter: Filter,
}

impl ViewFilter {
    pub fn scaffold(dataset: DatasetRef) -> Self {
        Self {
            dataset,
            filter: empty_filter(),
        }
    }
}

/// Presentation state attached to one linkset or lens spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: SpecId,
    pub created: Timestamp,
    #[serde(rename = "type")]
    pub kind: SpecType,
    pub properties: Vec<ViewProperty>,
    pub filters: Vec<ViewFilter>,
    #[serde(default)]
    pub prefix_mappings: BTreeMap<String, String>,
}

impl View {
    pub fn empty(id: SpecId, kind: SpecType) -> Self {
        Self {
            id,
            created: Timestamp::now(),
            kind,
            properties: Vec::new(),
            filters: Vec::new(),
            prefix_mappings: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dataset_equality_is_structural() {
        let a: DatasetRef = serde_json::from_value(json!({
            "timbuctoo_graphql": "https://example.org/graphql",
            "dataset_id": "ufab7d657a250e3461361c982ce9b38f3816e0c4b__ecartico_20200316",
            "collection_id": "foaf_Person"
        }))
        .unwrap();
        let b = DatasetRef::timbuctoo(
            "https://example.org/graphql",
            "ufab7d657a250e3461361c982ce9b38f3816e0c4b__ecartico_20200316",
            "foaf_Person",
        );
        assert_eq!(a, b);
        assert_eq!(a.kind(), DatasetKind::Timbuctoo);
        assert_ne!(a, DatasetRef::sparql("https://example.org/sparql", "foaf_Person"));
    }

    #[test]
    fn linkset_spec_parses_original_shape() {
        let spec: LinksetSpec = serde_json::from_value(json!({
            "id": 1,
            "created": "2024-03-01T12:00:00.000Z",
            "label": "Linkset 1",
            "description": "",
            "use_counter": true,
            "sources": [1, 2],
            "targets": [2, 3],
            "methods": {
                "type": "minimum_t_norm",
                "threshold": 0,
                "conditions": [{
                    "method": {"name": "exact", "config": {}},
                    "sim_method": {"name": null, "config": {}, "normalized": false},
                    "fuzzy": {"t_norm": "minimum_t_norm", "s_norm": "maximum_s_norm", "threshold": 0},
                    "list_matching": {"threshold": 0, "is_percentage": false},
                    "sources": {"properties": {"1": [{"property": ["name"], "transformers": []}]}, "transformers": []},
                    "targets": {"properties": {"3": [{"property": ["name"], "transformers": []}]}, "transformers": []}
                }]
            }
        }))
        .unwrap();

        assert_eq!(spec.entity_type_selection_ids(), vec![1, 2, 3]);
        let methods = spec.methods.leaves();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].method.name, "exact");
        assert!(methods[0].sources.properties.contains_key(&1));
    }

    #[test]
    fn integer_thresholds_are_written_back_unchanged() {
        let raw = json!({
            "id": 2,
            "created": "2024-03-01T12:00:00.000Z",
            "label": "Linkset 2",
            "description": "",
            "use_counter": false,
            "sources": [1],
            "targets": [1],
            "methods": {
                "type": "and",
                "threshold": 0,
                "conditions": [{
                    "method": {"name": "jaro_winkler", "config": {"threshold": 0.9}},
                    "sim_method": {"name": null, "config": {}, "normalized": false},
                    "fuzzy": {"t_norm": "minimum_t_norm", "s_norm": "maximum_s_norm", "threshold": 1},
                    "list_matching": {"threshold": 0, "is_percentage": true},
                    "sources": {"properties": {}, "transformers": []},
                    "targets": {"properties": {}, "transformers": []}
                }]
            }
        });
        let spec: LinksetSpec = serde_json::from_value(raw.clone()).unwrap();
        let written = serde_json::to_value(&spec).unwrap();
        assert_eq!(written, raw);
        assert_eq!(written["methods"]["threshold"].to_string(), "0");

        let lens: LensSpec = serde_json::from_value(json!({
            "id": 1,
            "created": "2024-03-01T12:00:00.000Z",
            "label": "Lens 1",
            "description": "",
            "specs": {"type": "union", "s_norm": "maximum_s_norm", "threshold": 0.5, "elements": []}
        }))
        .unwrap();
        let written = serde_json::to_value(&lens).unwrap();
        assert_eq!(written["specs"]["threshold"], json!(0.5));
    }

    #[test]
    fn view_serializes_type_field() {
        let view = View::empty(4, SpecType::Lens);
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["type"], "lens");
        assert_eq!(value["properties"], json!([]));
        assert_eq!(value["prefix_mappings"], json!({}));
    }
}
