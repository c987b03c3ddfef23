//! Routing of channel events into the sync engine and the caches.
//!
//! Each handler drains its channel sequentially, so events of one
//! namespace are applied in arrival order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::channel::ChannelEvent;
use super::events::{GlobalEvent, JobEvent};
use crate::cache::{Backend, CacheKey, QueryCache, ReferenceData};
use crate::sync::{SyncEngine, SyncOutcome};

/// Consumer of the job namespace
#[derive(Clone)]
pub struct JobEventHandler {
    engine: SyncEngine,
    reference: ReferenceData,
}

impl JobEventHandler {
    pub fn new(engine: SyncEngine, reference: ReferenceData) -> Self {
        Self { engine, reference }
    }

    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            if self.engine.session().is_closed() {
                break;
            }
            self.handle(event).await;
        }
        debug!("Event handler of job {} stopped", self.engine.session().job_id());
    }

    pub async fn handle(&self, event: ChannelEvent) {
        let job_id = self.engine.session().job_id().to_string();
        match event {
            ChannelEvent::Connected { reconnect: false } => {}
            ChannelEvent::Connected { reconnect: true } => self.on_reconnect(&job_id).await,
            ChannelEvent::Disconnected => warn!("Lost connection for job {}", job_id),
            ChannelEvent::Event { name, data } => match JobEvent::parse(&name, data) {
                Ok(Some(event)) => self.dispatch(event).await,
                Ok(None) => debug!("Unhandled event {} for job {}", name, job_id),
                Err(err) => warn!("Invalid {} payload for job {}: {}", name, job_id, err),
            },
        }
    }

    /// Events missed while disconnected are assumed to have happened
    async fn on_reconnect(&self, job_id: &str) {
        info!("Resynchronizing job {} after reconnect", job_id);
        match self.engine.resync().await {
            Ok(SyncOutcome::Merged(_)) => self.remember_baseline(),
            Ok(SyncOutcome::Skipped(_)) => {}
            Err(err) => error!("Resync of job {} failed: {}", job_id, err),
        }
        if let Err(err) = self.reference.refresh_job(job_id).await {
            error!("Refreshing status of job {} failed: {}", job_id, err);
        }
    }

    /// Keep the accepted server copy in the query cache
    fn remember_baseline(&self) {
        let session = self.engine.session();
        self.reference
            .cache()
            .insert(&CacheKey::Job(session.job_id().to_string()), session.baseline());
    }

    async fn dispatch(&self, event: JobEvent) {
        let result = match event {
            JobEvent::JobUpdate(update) => {
                match self.engine.handle_job_update(&update).await {
                    Ok(SyncOutcome::Skipped(reason)) => debug!("Skipped job update: {:?}", reason),
                    Ok(SyncOutcome::Merged(_)) => self.remember_baseline(),
                    Err(err) => error!("{}", err),
                }
                return;
            }
            JobEvent::AlignmentUpdate(update) => self.reference.on_alignment_update(&update).await,
            JobEvent::ClusteringUpdate(update) => self.reference.on_clustering_update(&update).await,
            JobEvent::AlignmentDelete(delete) => self.reference.on_alignment_delete(&delete).await,
            JobEvent::ClusteringDelete(delete) => self.reference.on_clustering_delete(&delete).await,
        };
        if let Err(err) = result {
            warn!("Refreshing status failed: {}", err);
        }
    }
}

/// Consumer of the root namespace; only touches the cache
#[derive(Clone)]
pub struct GlobalEventHandler {
    cache: Arc<QueryCache>,
}

impl GlobalEventHandler {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("Global event handler stopped");
    }

    pub fn handle(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected { reconnect: false } => {}
            ChannelEvent::Connected { reconnect: true } => {
                info!("Global channel reconnected, invalidating downloads");
                self.cache.invalidate_prefix("downloads/");
            }
            ChannelEvent::Disconnected => warn!("Lost global connection"),
            ChannelEvent::Event { name, data } => match GlobalEvent::parse(&name, data) {
                Ok(Some(event)) => self.dispatch(event),
                Ok(None) => debug!("Unhandled global event {}", name),
                Err(err) => warn!("Invalid {} payload: {}", name, err),
            },
        }
    }

    fn dispatch(&self, event: GlobalEvent) {
        match event {
            GlobalEvent::SparqlLoadUpdate(update) => self.cache.apply_sparql_load_update(&update),
            GlobalEvent::SparqlStatusUpdate(update) => self.cache.apply_sparql_status_update(&update),
            GlobalEvent::TimbuctooStatusUpdate(update) => self.cache.apply_timbuctoo_status_update(&update),
            GlobalEvent::SparqlUpdate(download) => self.cache.apply_download_update(Backend::Sparql, download),
            GlobalEvent::TimbuctooUpdate(download) => {
                self.cache.apply_download_update(Backend::Timbuctoo, download)
            }
            GlobalEvent::SparqlLoadDelete(update) => {
                self.cache.reset_datasets(Backend::Sparql, &update.sparql_endpoint)
            }
            GlobalEvent::SparqlDelete => self.cache.reset_downloads(Backend::Sparql),
            GlobalEvent::TimbuctooDelete => self.cache.reset_downloads(Backend::Timbuctoo),
            GlobalEvent::ExtensionUpdate => {
                info!("Server extensions changed, invalidating methods");
                self.cache.reset_methods();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiResult, ReferenceSource};
    use crate::cache::DatasetListing;
    use crate::model::status::{Clustering, Lens, Linkset};
    use crate::model::{Methods, SpecRecord, Timestamp};
    use crate::session::tests::{job, MemorySource};
    use crate::session::JobSession;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct CountingReference {
        fetches: Mutex<usize>,
    }

    #[async_trait]
    impl ReferenceSource for CountingReference {
        async fn fetch_methods(&self) -> ApiResult<Methods> {
            Ok(Methods::default())
        }

        async fn fetch_linksets(&self, _job_id: &str) -> ApiResult<Vec<Linkset>> {
            *self.fetches.lock() += 1;
            Ok(Vec::new())
        }

        async fn fetch_lenses(&self, _job_id: &str) -> ApiResult<Vec<Lens>> {
            *self.fetches.lock() += 1;
            Ok(Vec::new())
        }

        async fn fetch_clusterings(&self, _job_id: &str) -> ApiResult<Vec<Clustering>> {
            *self.fetches.lock() += 1;
            Ok(Vec::new())
        }

        async fn fetch_datasets(&self, _backend: Backend, _endpoint: &str) -> ApiResult<DatasetListing> {
            Ok(DatasetListing::new())
        }

        async fn fetch_downloads(&self, _backend: Backend) -> ApiResult<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
    }

    fn job_handler() -> (Arc<MemorySource>, Arc<CountingReference>, JobEventHandler) {
        let initial = job("2024-03-01T11:00:00.000Z");
        let source = Arc::new(MemorySource::new(initial.clone()));
        let session = Arc::new(JobSession::from_job(initial));
        let engine = SyncEngine::new(session, source.clone());
        let counting = Arc::new(CountingReference::default());
        let reference = ReferenceData::new(Arc::new(QueryCache::default()), counting.clone());
        (source, counting, JobEventHandler::new(engine, reference))
    }

    #[tokio::test]
    async fn job_update_event_reaches_the_engine() {
        let (source, _, handler) = job_handler();
        let mut server = job("2024-03-01T12:00:00.000Z");
        server.specs.lens_specs = vec![crate::model::LensSpec::scaffold(1, Timestamp::new("t1"), 0)];
        *source.job.lock() = server;

        handler
            .handle(ChannelEvent::Event {
                name: "job_update".into(),
                data: json!({
                    "job_id": "job1",
                    "updated_at": "2024-03-01T12:00:00.000Z",
                    "is_lens_specs_update": true
                }),
            })
            .await;

        assert_eq!(handler.engine.session().specs().lens_specs.len(), 1);
        let cached: Option<crate::model::Job> = handler.reference.cache().get(&CacheKey::Job("job1".into()));
        assert_eq!(cached.map(|job| job.specs.lens_specs.len()), Some(1));
    }

    #[tokio::test]
    async fn reconnect_resyncs_and_refreshes_status() {
        let (source, counting, handler) = job_handler();
        let mut server = job("2024-03-01T11:00:00.000Z");
        server.job_title = "Changed while offline".into();
        *source.job.lock() = server;

        handler.handle(ChannelEvent::Connected { reconnect: false }).await;
        assert_eq!(*counting.fetches.lock(), 0);

        handler.handle(ChannelEvent::Connected { reconnect: true }).await;
        assert_eq!(*counting.fetches.lock(), 3);
        assert_eq!(handler.engine.session().baseline().job_title, "Changed while offline");
    }

    #[tokio::test]
    async fn invalid_payloads_are_skipped() {
        let (_, counting, handler) = job_handler();
        handler
            .handle(ChannelEvent::Event {
                name: "alignment_delete".into(),
                data: json!("garbage"),
            })
            .await;
        handler
            .handle(ChannelEvent::Event {
                name: "unknown".into(),
                data: json!({}),
            })
            .await;
        assert_eq!(*counting.fetches.lock(), 0);
    }

    #[test]
    fn global_events_touch_the_cache() {
        let cache = Arc::new(QueryCache::default());
        cache.insert(&CacheKey::Methods, 0u8);
        cache.insert(&CacheKey::Downloads(Backend::Sparql), Vec::<serde_json::Value>::new());
        cache.insert(&CacheKey::Downloads(Backend::Timbuctoo), Vec::<serde_json::Value>::new());
        let handler = GlobalEventHandler::new(cache.clone());

        handler.handle(ChannelEvent::Event {
            name: "extension_update".into(),
            data: serde_json::Value::Null,
        });
        assert!(cache.is_stale(&CacheKey::Methods));

        handler.handle(ChannelEvent::Event {
            name: "sparql_update".into(),
            data: json!({"sparql_endpoint": "e", "entity_type_id": "P"}),
        });
        let downloads = cache
            .get::<Vec<serde_json::Value>>(&CacheKey::Downloads(Backend::Sparql))
            .unwrap();
        assert_eq!(downloads.len(), 1);

        handler.handle(ChannelEvent::Connected { reconnect: true });
        assert!(cache.is_stale(&CacheKey::Downloads(Backend::Timbuctoo)));
    }
}
