//! Cache patches driven by the global channel: dataset listings, entity
//! type load status, downloads and the method catalog.
//!
//! Dataset listings are maps of dataset id to dataset object; downloads are
//! lists of download objects. Both are kept as JSON since the client only
//! displays them.

use serde_json::{Map, Value};
use tracing::debug;

use super::{Backend, CacheKey, QueryCache};
use crate::model::status::{SparqlDatasetUpdate, SparqlStatusUpdate, TimbuctooStatusUpdate};

/// Listing of the datasets of one endpoint
pub type DatasetListing = Map<String, Value>;

fn download_fields(backend: Backend) -> &'static [&'static str] {
    match backend {
        Backend::Sparql => &["sparql_endpoint", "entity_type_id"],
        Backend::Timbuctoo => &["graphql_endpoint", "timbuctoo_id", "entity_type_id"],
    }
}

/// Whether two download objects describe the same download
pub fn download_matches(backend: Backend, a: &Value, b: &Value) -> bool {
    download_fields(backend)
        .iter()
        .all(|field| a.get(field) == b.get(field))
}

fn set_entity_status(dataset: Option<&mut Value>, entity_type_id: &str, status: &str) -> bool {
    let Some(entity_types) = dataset
        .and_then(Value::as_object_mut)
        .and_then(|dataset| dataset.get_mut("entity_types"))
        .and_then(Value::as_object_mut)
    else {
        return false;
    };

    let entity_type = entity_types
        .entry(entity_type_id.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match entity_type.as_object_mut() {
        Some(entity_type) => {
            entity_type.insert("status".into(), Value::String(status.to_string()));
            true
        }
        None => false,
    }
}

impl QueryCache {
    /// `sparql_load_update`: a finished load invalidates the listing,
    /// anything else patches the dataset status.
    pub fn apply_sparql_load_update(&self, update: &SparqlDatasetUpdate) {
        let key = CacheKey::Datasets(Backend::Sparql, update.sparql_endpoint.clone());
        let Some(status) = update.status.as_deref() else {
            self.invalidate(&key);
            return;
        };
        if status == "finished" {
            self.invalidate(&key);
            return;
        }

        self.update::<DatasetListing, _>(&key, |datasets| {
            if let Some(dataset) = datasets
                .get_mut(&update.sparql_endpoint)
                .and_then(Value::as_object_mut)
            {
                dataset.insert("status".into(), Value::String(status.to_string()));
            }
        });
    }

    /// `sparql_status_update`: one entity type of a SPARQL dataset changed
    pub fn apply_sparql_status_update(&self, update: &SparqlStatusUpdate) {
        let key = CacheKey::Datasets(Backend::Sparql, update.sparql_endpoint.clone());
        self.update::<DatasetListing, _>(&key, |datasets| {
            let dataset = datasets.get_mut(&update.sparql_endpoint);
            if !set_entity_status(dataset, &update.entity_type_id, &update.status) {
                debug!("No cached SPARQL dataset for {}", update.sparql_endpoint);
            }
        });
    }

    /// `timbuctoo_status_update`: one entity type of a Timbuctoo dataset changed
    pub fn apply_timbuctoo_status_update(&self, update: &TimbuctooStatusUpdate) {
        let key = CacheKey::Datasets(Backend::Timbuctoo, update.graphql_endpoint.clone());
        self.update::<DatasetListing, _>(&key, |datasets| {
            let dataset = datasets.get_mut(&update.timbuctoo_id);
            if !set_entity_status(dataset, &update.entity_type_id, &update.status) {
                debug!("No cached Timbuctoo dataset {}", update.timbuctoo_id);
            }
        });
    }

    /// `sparql_update` / `timbuctoo_update`: replace the matching download,
    /// appending it at the end
    pub fn apply_download_update(&self, backend: Backend, download: Value) {
        self.update::<Vec<Value>, _>(&CacheKey::Downloads(backend), |downloads| {
            downloads.retain(|existing| !download_matches(backend, existing, &download));
            downloads.push(download);
        });
    }

    pub fn reset_datasets(&self, backend: Backend, endpoint: &str) {
        self.invalidate(&CacheKey::Datasets(backend, endpoint.to_string()));
    }

    pub fn reset_downloads(&self, backend: Backend) {
        self.invalidate(&CacheKey::Downloads(backend));
    }

    pub fn reset_methods(&self) {
        self.invalidate(&CacheKey::Methods);
    }
}
