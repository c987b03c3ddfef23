//! Server-side processing status of linksets, lenses and clusterings, and
//! the socket payloads that patch them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::records::SpecType;
use super::SpecId;

/// Status of a linkset computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linkset {
    pub job_id: String,
    pub spec_id: SpecId,
    pub status: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub links_progress: Option<i64>,
    #[serde(default)]
    pub links_count: Option<i64>,
    /// Counters, timestamps and prefix mappings the client only displays
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status of a lens computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lens {
    pub job_id: String,
    pub spec_id: SpecId,
    pub status: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub links_count: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status of a clustering run over a linkset or lens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clustering {
    pub job_id: String,
    pub spec_id: SpecId,
    pub spec_type: SpecType,
    pub clustering_type: String,
    pub status: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub links_count: Option<i64>,
    #[serde(default)]
    pub clusters_count: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentUpdate {
    pub job_id: String,
    pub spec_type: SpecType,
    pub spec_id: SpecId,
    pub status: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub links_progress: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentDelete {
    pub job_id: String,
    pub spec_type: SpecType,
    pub spec_id: SpecId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringUpdate {
    pub job_id: String,
    pub spec_type: SpecType,
    pub spec_id: SpecId,
    pub clustering_type: String,
    pub status: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub links_count: Option<i64>,
    #[serde(default)]
    pub clusters_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringDelete {
    pub job_id: String,
    pub spec_type: SpecType,
    pub spec_id: SpecId,
    pub clustering_type: String,
}

/// Payload of `sparql_load_update` and `sparql_load_delete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparqlDatasetUpdate {
    pub sparql_endpoint: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `sparql_status_update`: one entity type changed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparqlStatusUpdate {
    pub sparql_endpoint: String,
    pub entity_type_id: String,
    pub status: String,
}

/// Payload of `timbuctoo_status_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimbuctooStatusUpdate {
    pub graphql_endpoint: String,
    pub timbuctoo_id: String,
    pub entity_type_id: String,
    pub status: String,
}
