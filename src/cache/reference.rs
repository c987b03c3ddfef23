//! Status collections of the open job, dataset and download listings, and
//! the method catalog.
//!
//! Reads are served from the [`QueryCache`] while fresh and refetched
//! through a [`ReferenceSource`] otherwise. Socket events either patch the
//! cached collection in place or trigger a refetch when the change is too
//! large to patch (a status transition, an unknown spec).

use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Backend, CacheKey, DatasetListing, QueryCache};
use crate::api::{ApiResult, ReferenceSource};
use crate::model::status::{
    AlignmentDelete, AlignmentUpdate, Clustering, ClusteringDelete, ClusteringUpdate, Lens, Linkset,
};
use crate::model::{DatasetKind, Job, Methods, SpecType};

/// Cached reference data backed by the server
#[derive(Clone)]
pub struct ReferenceData {
    cache: Arc<QueryCache>,
    source: Arc<dyn ReferenceSource>,
}

impl ReferenceData {
    pub fn new(cache: Arc<QueryCache>, source: Arc<dyn ReferenceSource>) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub async fn methods(&self) -> ApiResult<Methods> {
        if let Some(methods) = self.cache.get_fresh(&CacheKey::Methods) {
            return Ok(methods);
        }
        let methods = self.source.fetch_methods().await?;
        self.cache.insert(&CacheKey::Methods, methods.clone());
        Ok(methods)
    }

    pub async fn linksets(&self, job_id: &str) -> ApiResult<Vec<Linkset>> {
        match self.cache.get_fresh(&CacheKey::Linksets(job_id.to_string())) {
            Some(linksets) => Ok(linksets),
            None => self.refetch_linksets(job_id).await,
        }
    }

    pub async fn lenses(&self, job_id: &str) -> ApiResult<Vec<Lens>> {
        match self.cache.get_fresh(&CacheKey::Lenses(job_id.to_string())) {
            Some(lenses) => Ok(lenses),
            None => self.refetch_lenses(job_id).await,
        }
    }

    pub async fn clusterings(&self, job_id: &str) -> ApiResult<Vec<Clustering>> {
        match self.cache.get_fresh(&CacheKey::Clusterings(job_id.to_string())) {
            Some(clusterings) => Ok(clusterings),
            None => self.refetch_clusterings(job_id).await,
        }
    }

    pub async fn refetch_linksets(&self, job_id: &str) -> ApiResult<Vec<Linkset>> {
        let linksets = self.source.fetch_linksets(job_id).await?;
        self.cache.insert(&CacheKey::Linksets(job_id.to_string()), linksets.clone());
        Ok(linksets)
    }

    pub async fn refetch_lenses(&self, job_id: &str) -> ApiResult<Vec<Lens>> {
        let lenses = self.source.fetch_lenses(job_id).await?;
        self.cache.insert(&CacheKey::Lenses(job_id.to_string()), lenses.clone());
        Ok(lenses)
    }

    pub async fn refetch_clusterings(&self, job_id: &str) -> ApiResult<Vec<Clustering>> {
        let clusterings = self.source.fetch_clusterings(job_id).await?;
        self.cache
            .insert(&CacheKey::Clusterings(job_id.to_string()), clusterings.clone());
        Ok(clusterings)
    }

    pub async fn datasets(&self, backend: Backend, endpoint: &str) -> ApiResult<DatasetListing> {
        match self.cache.get_fresh(&CacheKey::Datasets(backend, endpoint.to_string())) {
            Some(datasets) => Ok(datasets),
            None => self.refetch_datasets(backend, endpoint).await,
        }
    }

    pub async fn refetch_datasets(&self, backend: Backend, endpoint: &str) -> ApiResult<DatasetListing> {
        let datasets = self.source.fetch_datasets(backend, endpoint).await?;
        self.cache
            .insert(&CacheKey::Datasets(backend, endpoint.to_string()), datasets.clone());
        Ok(datasets)
    }

    pub async fn downloads(&self, backend: Backend) -> ApiResult<Vec<Value>> {
        if let Some(downloads) = self.cache.get_fresh(&CacheKey::Downloads(backend)) {
            return Ok(downloads);
        }
        let downloads = self.source.fetch_downloads(backend).await?;
        self.cache.insert(&CacheKey::Downloads(backend), downloads.clone());
        Ok(downloads)
    }

    /// Load the dataset listings of every endpoint the job's entity-type
    /// selections point at. Failures are logged; returns how many loaded.
    pub async fn prefetch_job_datasets(&self, job: &Job) -> usize {
        let endpoints = dataset_endpoints(job);
        let results = join_all(
            endpoints
                .iter()
                .map(|(backend, endpoint)| self.datasets(*backend, endpoint)),
        )
        .await;

        let mut loaded = 0;
        for ((backend, endpoint), result) in endpoints.iter().zip(results) {
            match result {
                Ok(_) => loaded += 1,
                Err(err) => warn!("Loading {} datasets of {} failed: {}", backend, endpoint, err),
            }
        }
        loaded
    }

    /// Both download listings; failures are only logged
    pub async fn prefetch_downloads(&self) {
        let (sparql, timbuctoo) = tokio::join!(self.downloads(Backend::Sparql), self.downloads(Backend::Timbuctoo));
        for (backend, result) in [(Backend::Sparql, sparql.map(|_| ())), (Backend::Timbuctoo, timbuctoo.map(|_| ()))] {
            if let Err(err) = result {
                warn!("Loading {} downloads failed: {}", backend, err);
            }
        }
    }

    /// Patch progress in place, or refetch when the status itself moved
    pub async fn on_alignment_update(&self, update: &AlignmentUpdate) -> ApiResult<()> {
        match update.spec_type {
            SpecType::Linkset => {
                let key = CacheKey::Linksets(update.job_id.clone());
                if self.needs_linkset_refetch(update) {
                    self.refetch_linksets(&update.job_id).await?;
                } else {
                    self.cache.update::<Vec<Linkset>, _>(&key, |linksets| {
                        if let Some(linkset) = linksets.iter_mut().find(|l| l.spec_id == update.spec_id) {
                            linkset.status_message = update.status_message.clone();
                            linkset.links_progress = update.links_progress;
                        }
                    });
                }
            }
            SpecType::Lens => {
                let key = CacheKey::Lenses(update.job_id.clone());
                if self.needs_lens_refetch(update) {
                    self.refetch_lenses(&update.job_id).await?;
                } else {
                    self.cache.update::<Vec<Lens>, _>(&key, |lenses| {
                        if let Some(lens) = lenses.iter_mut().find(|l| l.spec_id == update.spec_id) {
                            lens.status_message = update.status_message.clone();
                        }
                    });
                }
            }
        }
        Ok(())
    }

    fn needs_linkset_refetch(&self, update: &AlignmentUpdate) -> bool {
        let linksets: Option<Vec<Linkset>> = self.cache.get(&CacheKey::Linksets(update.job_id.clone()));
        linksets
            .as_ref()
            .and_then(|linksets| linksets.iter().find(|l| l.spec_id == update.spec_id))
            .map_or(true, |l| l.status != update.status || l.status_message != update.status_message)
    }

    fn needs_lens_refetch(&self, update: &AlignmentUpdate) -> bool {
        let lenses: Option<Vec<Lens>> = self.cache.get(&CacheKey::Lenses(update.job_id.clone()));
        lenses
            .as_ref()
            .and_then(|lenses| lenses.iter().find(|l| l.spec_id == update.spec_id))
            .map_or(true, |l| l.status != update.status || l.status_message != update.status_message)
    }

    /// Clusterings are keyed by `(spec_type, spec_id)`
    pub async fn on_clustering_update(&self, update: &ClusteringUpdate) -> ApiResult<()> {
        let key = CacheKey::Clusterings(update.job_id.clone());
        let mut found = false;
        self.cache.update::<Vec<Clustering>, _>(&key, |clusterings| {
            let Some(clustering) = clusterings
                .iter_mut()
                .find(|c| c.spec_type == update.spec_type && c.spec_id == update.spec_id)
            else {
                return;
            };
            if clustering.status == update.status {
                found = true;
                clustering.status_message = update.status_message.clone();
                clustering.links_count = update.links_count;
                clustering.clusters_count = update.clusters_count;
            }
        });

        if !found {
            debug!(
                "Clustering of {} {} changed status to {}",
                update.spec_type, update.spec_id, update.status
            );
            self.refetch_clusterings(&update.job_id).await?;
        }
        Ok(())
    }

    pub async fn on_alignment_delete(&self, delete: &AlignmentDelete) -> ApiResult<()> {
        info!("Results of {} {} were deleted", delete.spec_type, delete.spec_id);
        self.reset_alignments(&delete.job_id).await
    }

    pub async fn on_clustering_delete(&self, delete: &ClusteringDelete) -> ApiResult<()> {
        info!(
            "Clustering {} of {} {} was deleted",
            delete.clustering_type, delete.spec_type, delete.spec_id
        );
        self.cache.invalidate(&CacheKey::Clusterings(delete.job_id.clone()));
        self.refetch_clusterings(&delete.job_id).await.map(|_| ())
    }

    async fn reset_alignments(&self, job_id: &str) -> ApiResult<()> {
        self.cache.invalidate(&CacheKey::Linksets(job_id.to_string()));
        self.cache.invalidate(&CacheKey::Lenses(job_id.to_string()));
        let (linksets, lenses) = tokio::join!(self.refetch_linksets(job_id), self.refetch_lenses(job_id));
        linksets?;
        lenses?;
        Ok(())
    }

    /// After a reconnect: every status collection of the job may be out of date
    pub async fn refresh_job(&self, job_id: &str) -> ApiResult<()> {
        self.cache.invalidate(&CacheKey::Clusterings(job_id.to_string()));
        let (alignments, clusterings) =
            tokio::join!(self.reset_alignments(job_id), self.refetch_clusterings(job_id));
        if let Err(err) = &clusterings {
            warn!("Refreshing clusterings of job {} failed: {}", job_id, err);
        }
        alignments?;
        clusterings.map(|_| ())
    }
}

/// Distinct dataset endpoints referenced by the job, in selection order
fn dataset_endpoints(job: &Job) -> Vec<(Backend, String)> {
    let mut endpoints: Vec<(Backend, String)> = Vec::new();
    for dataset in job.specs.entity_type_selections.iter().filter_map(|ets| ets.dataset.as_ref()) {
        let endpoint = match dataset.kind() {
            DatasetKind::Sparql => dataset.sparql_endpoint().map(|e| (Backend::Sparql, e)),
            DatasetKind::Timbuctoo => dataset.graphql_endpoint().map(|e| (Backend::Timbuctoo, e)),
            DatasetKind::Unknown => None,
        };
        if let Some((backend, endpoint)) = endpoint {
            if !endpoints.iter().any(|(b, e)| *b == backend && e == endpoint) {
                endpoints.push((backend, endpoint.to_string()));
            }
        }
    }
    endpoints
}
