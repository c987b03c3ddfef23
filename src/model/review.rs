//! Links, clusters and samples produced by running a job, and the filters
//! used to page through them while reviewing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::timestamp::Timestamp;

pub const LINKS_PAGE_SIZE: u32 = 20;
pub const CLUSTERS_PAGE_SIZE: u32 = 5;
pub const SAMPLES_PAGE_SIZE: u32 = 50;

/// Form fields of a review request, in the order they are sent
pub type FormFields = Vec<(&'static str, String)>;

/// Review state of one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Accepted,
    Rejected,
    Uncertain,
    Unchecked,
    Disputed,
}

impl Validation {
    pub const ALL: [Validation; 5] = [
        Validation::Accepted,
        Validation::Rejected,
        Validation::Uncertain,
        Validation::Unchecked,
        Validation::Disputed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Validation::Accepted => "accepted",
            Validation::Rejected => "rejected",
            Validation::Uncertain => "uncertain",
            Validation::Unchecked => "unchecked",
            Validation::Disputed => "disputed",
        }
    }

    /// State after asking for `requested`; asking for the current state
    /// again clears it.
    pub fn toggle(self, requested: Validation) -> Validation {
        if self == requested {
            Validation::Unchecked
        } else {
            requested
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of links per review state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksTotals {
    pub accepted: u64,
    pub rejected: u64,
    pub uncertain: u64,
    pub unchecked: u64,
    pub disputed: u64,
}

impl LinksTotals {
    pub fn get(&self, state: Validation) -> u64 {
        match state {
            Validation::Accepted => self.accepted,
            Validation::Rejected => self.rejected,
            Validation::Uncertain => self.uncertain,
            Validation::Unchecked => self.unchecked,
            Validation::Disputed => self.disputed,
        }
    }

    fn slot(&mut self, state: Validation) -> &mut u64 {
        match state {
            Validation::Accepted => &mut self.accepted,
            Validation::Rejected => &mut self.rejected,
            Validation::Uncertain => &mut self.uncertain,
            Validation::Unchecked => &mut self.unchecked,
            Validation::Disputed => &mut self.disputed,
        }
    }

    pub fn total(&self) -> u64 {
        Validation::ALL.iter().map(|state| self.get(*state)).sum()
    }

    /// Move one link from `before` to `after`
    pub fn move_link(&mut self, before: Validation, after: Validation) {
        if before == after {
            return;
        }
        let from = self.slot(before);
        *from = from.saturating_sub(1);
        *self.slot(after) += 1;
    }
}

/// One link between a source and a target entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub valid: Validation,
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<i64>,
    #[serde(default)]
    pub cluster_hash_id: Option<String>,
    #[serde(default)]
    pub link_order: Option<String>,
    /// 1-based position in the listing, assigned while paging
    #[serde(default)]
    pub count: u64,
    /// Collections, intermediates and property values, only displayed
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Which links to list or count
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFilter {
    pub cluster_ids: Vec<i64>,
    /// Similarity bounds; `0` and `1` mean unbounded
    pub min: f64,
    pub max: f64,
    pub states: Vec<Validation>,
    pub sort: Option<SortOrder>,
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self {
            cluster_ids: Vec::new(),
            min: 0.0,
            max: 1.0,
            states: Validation::ALL.to_vec(),
            sort: None,
        }
    }
}

impl LinkFilter {
    /// Fields of a totals request. Cluster and similarity bounds are only
    /// sent when filters apply.
    pub fn totals_form(&self, apply_filters: bool) -> FormFields {
        let mut fields = vec![("apply_filters", apply_filters.to_string())];
        if apply_filters {
            for cluster_id in &self.cluster_ids {
                fields.push(("cluster_id", cluster_id.to_string()));
            }
            if self.min > 0.0 {
                fields.push(("min", self.min.to_string()));
            }
            if self.max < 1.0 {
                fields.push(("max", self.max.to_string()));
            }
        }
        fields
    }

    /// Fields of a listing or selection request
    pub fn links_form(&self, apply_filters: bool, with_properties: Option<&str>, page: Option<u32>) -> FormFields {
        let mut fields = self.totals_form(apply_filters);
        if let Some(with_properties) = with_properties {
            fields.push(("with_properties", with_properties.to_string()));
        }
        for state in Validation::ALL {
            if self.states.contains(&state) {
                fields.push(("valid", state.as_str().to_string()));
            }
        }
        if let Some(sort) = self.sort {
            fields.push(("sort", sort.as_str().to_string()));
        }
        if let Some(page) = page {
            fields.push(("limit", LINKS_PAGE_SIZE.to_string()));
            fields.push(("offset", (LINKS_PAGE_SIZE * page).to_string()));
        }
        fields
    }
}

// ============================================================================
// CLUSTERS
// ============================================================================

/// A cluster of linked entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub hash_id: String,
    #[serde(default)]
    pub links: LinksTotals,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub extended: bool,
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default)]
    pub values: Vec<Value>,
    /// Counts under the active filter, joined in from a second listing
    #[serde(default)]
    pub links_filtered: LinksTotals,
    #[serde(default)]
    pub size_filtered: u64,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClustersTotals {
    pub total: u64,
    #[serde(default)]
    pub cluster_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSort {
    SizeAsc,
    SizeDesc,
    CountAsc,
    CountDesc,
}

impl ClusterSort {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterSort::SizeAsc => "size_asc",
            ClusterSort::SizeDesc => "size_desc",
            ClusterSort::CountAsc => "count_asc",
            ClusterSort::CountDesc => "count_desc",
        }
    }
}

/// Size and link-count bounds on listed clusters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterFilter {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_count: Option<u64>,
    pub max_count: Option<u64>,
    pub sort: Option<ClusterSort>,
}

impl ClusterFilter {
    pub fn totals_form(&self, apply_filters: bool) -> FormFields {
        let mut fields = vec![("apply_filters", apply_filters.to_string())];
        if apply_filters {
            let bounds = [
                ("min_size", self.min_size.filter(|v| *v > 0)),
                ("max_size", self.max_size),
                ("min_count", self.min_count.filter(|v| *v > 0)),
                ("max_count", self.max_count),
            ];
            for (name, bound) in bounds {
                if let Some(bound) = bound {
                    fields.push((name, bound.to_string()));
                }
            }
        }
        fields
    }

    pub fn clusters_form(&self, apply_filters: bool, with_properties: &str, page: Option<u32>) -> FormFields {
        let mut fields = self.totals_form(apply_filters);
        fields.push(("with_properties", with_properties.to_string()));
        if let Some(sort) = self.sort {
            fields.push(("sort", sort.as_str().to_string()));
        }
        if let Some(page) = page {
            fields.push(("limit", CLUSTERS_PAGE_SIZE.to_string()));
            fields.push(("offset", (CLUSTERS_PAGE_SIZE * page).to_string()));
        }
        fields
    }
}

/// Graphs of one cluster. Only rendered, so kept as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterGraph {
    pub cluster_graph: Value,
    pub cluster_graph_compact: Value,
    pub reconciliation_graph: Value,
}

// ============================================================================
// SAMPLES & JOB LISTING
// ============================================================================

/// One entity of an entity-type selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub uri: String,
    #[serde(default)]
    pub properties: Vec<Value>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRole {
    Owner,
    Shared,
}

/// A job as listed for the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub job_id: String,
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub job_link: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    pub role: JobRole,
}

/// Give each item of page `page` its 1-based position in the listing
pub fn number_page<T>(items: &mut [T], page: u32, page_size: u32, count: impl Fn(&mut T) -> &mut u64) {
    let first = u64::from(page_size) * u64::from(page);
    for (idx, item) in items.iter_mut().enumerate() {
        *count(item) = first + idx as u64 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validating_twice_clears_the_state() {
        assert_eq!(Validation::Unchecked.toggle(Validation::Accepted), Validation::Accepted);
        assert_eq!(Validation::Accepted.toggle(Validation::Accepted), Validation::Unchecked);
        assert_eq!(Validation::Rejected.toggle(Validation::Disputed), Validation::Disputed);
    }

    #[test]
    fn totals_follow_a_validation() {
        let mut totals: LinksTotals = serde_json::from_value(json!({"accepted": 2, "unchecked": 5})).unwrap();
        totals.move_link(Validation::Unchecked, Validation::Accepted);
        assert_eq!(totals.accepted, 3);
        assert_eq!(totals.unchecked, 4);
        assert_eq!(totals.total(), 7);

        totals.move_link(Validation::Rejected, Validation::Uncertain);
        assert_eq!(totals.rejected, 0);
        assert_eq!(totals.uncertain, 1);
    }

    #[test]
    fn link_forms_only_carry_active_filters() {
        let filter = LinkFilter::default();
        assert_eq!(filter.totals_form(true), vec![("apply_filters", "true".to_string())]);

        let filter = LinkFilter {
            cluster_ids: vec![4, 9],
            min: 0.5,
            states: vec![Validation::Disputed, Validation::Accepted],
            sort: Some(SortOrder::Desc),
            ..LinkFilter::default()
        };
        assert_eq!(filter.totals_form(false), vec![("apply_filters", "false".to_string())]);

        let fields = filter.links_form(true, Some("multiple"), Some(2));
        let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("apply_filters", "true"),
                ("cluster_id", "4"),
                ("cluster_id", "9"),
                ("min", "0.5"),
                ("with_properties", "multiple"),
                ("valid", "accepted"),
                ("valid", "disputed"),
                ("sort", "desc"),
                ("limit", "20"),
                ("offset", "40"),
            ]
        );
    }

    #[test]
    fn cluster_forms_skip_zero_lower_bounds() {
        let filter = ClusterFilter {
            min_size: Some(0),
            max_size: Some(10),
            min_count: Some(2),
            sort: Some(ClusterSort::SizeDesc),
            ..ClusterFilter::default()
        };
        let fields = filter.clusters_form(true, "none", Some(1));
        let names: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec!["apply_filters", "max_size", "min_count", "with_properties", "sort", "limit", "offset"]
        );
        assert_eq!(fields.last().map(|(_, v)| v.as_str()), Some("5"));
    }

    #[test]
    fn links_keep_unknown_fields() {
        let mut links: Vec<Link> = serde_json::from_value(json!([
            {"source": "s1", "target": "t1", "valid": "unchecked", "similarity": 0.9,
             "source_collections": [1], "cluster_id": 3},
            {"source": "s2", "target": "t2", "valid": "accepted", "motivation": "same name"}
        ]))
        .unwrap();
        number_page(&mut links, 1, LINKS_PAGE_SIZE, |link| &mut link.count);

        assert_eq!(links[0].count, 21);
        assert_eq!(links[1].count, 22);
        assert_eq!(links[0].extra["source_collections"], json!([1]));
        assert_eq!(links[1].motivation.as_deref(), Some("same name"));
    }

    #[test]
    fn job_listing_parses_roles() {
        let listing: JobListing = serde_json::from_value(json!({
            "job_id": "abc",
            "job_title": "Persons",
            "job_description": "",
            "job_link": null,
            "created_at": "2024-03-01T10:00:00",
            "updated_at": null,
            "role": "shared"
        }))
        .unwrap();
        assert_eq!(listing.role, JobRole::Shared);
        assert!(listing.updated_at.is_none());
    }
}
