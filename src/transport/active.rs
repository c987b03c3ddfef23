//! The one open job and the global channel.
//!
//! At most one job channel and one global channel exist at a time. Opening
//! another job tears down the previous job's session and channel first.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::channel::{Backoff, SocketChannel};
use super::handlers::{GlobalEventHandler, JobEventHandler};
use super::protocol::ROOT_NAMESPACE;
use super::{socket_url, TransportResult};
use crate::api::{JobApi, JobSource, ReferenceSource};
use crate::cache::{CacheKey, QueryCache, ReferenceData};
use crate::config::ClientConfig;
use crate::session::JobSession;
use crate::sync::SyncEngine;

struct OpenJob {
    session: Arc<JobSession>,
    channel: SocketChannel,
    handler: JoinHandle<()>,
}

struct GlobalChannel {
    shutdown_tx: broadcast::Sender<()>,
    channel: SocketChannel,
    handler: JoinHandle<()>,
}

/// Registry of live channels
pub struct ActiveJob {
    config: ClientConfig,
    jobs: Arc<dyn JobSource>,
    reference: ReferenceData,
    job: Mutex<Option<OpenJob>>,
    global: Mutex<Option<GlobalChannel>>,
}

impl ActiveJob {
    /// Registry talking to the server named in `config`
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        let api = Arc::new(JobApi::new(&config)?);
        Ok(Self::with_sources(config, api.clone(), api))
    }

    pub fn with_sources(
        config: ClientConfig,
        jobs: Arc<dyn JobSource>,
        reference: Arc<dyn ReferenceSource>,
    ) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache.clone()));
        Self {
            config,
            jobs,
            reference: ReferenceData::new(cache, reference),
            job: Mutex::new(None),
            global: Mutex::new(None),
        }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    fn backoff(&self) -> Backoff {
        Backoff {
            base: self.config.reconnect_delay,
            max: self.config.reconnect_max_delay,
        }
    }

    /// Session of the open job, if any
    pub fn session(&self) -> Option<Arc<JobSession>> {
        self.job.lock().as_ref().map(|open| open.session.clone())
    }

    /// Open `job_id` and connect its channel. Returns the existing session
    /// when that job is already open.
    pub async fn open_job(&self, job_id: &str) -> TransportResult<Arc<JobSession>> {
        if let Some(session) = self.session() {
            if session.job_id() == job_id && !session.is_closed() {
                return Ok(session);
            }
        }
        self.leave_job();

        let session = JobSession::open(job_id, self.jobs.as_ref()).await?;
        let baseline = session.baseline();
        let loaded = self.reference.prefetch_job_datasets(&baseline).await;
        debug!("Loaded {} dataset listings for job {}", loaded, job_id);
        self.reference
            .cache()
            .insert(&CacheKey::Job(job_id.to_string()), baseline);
        let namespace = format!("/{}", job_id);
        let (channel, events) = SocketChannel::spawn(
            socket_url(&self.config.ws_url),
            namespace,
            self.backoff(),
            session.subscribe_shutdown(),
        );

        let engine = SyncEngine::new(session.clone(), self.jobs.clone());
        let handler = tokio::spawn(JobEventHandler::new(engine, self.reference.clone()).run(events));

        let previous = self.job.lock().replace(OpenJob {
            session: session.clone(),
            channel,
            handler,
        });
        // Lost a race with another open_job call
        if let Some(previous) = previous {
            self.teardown(previous);
        }
        Ok(session)
    }

    fn teardown(&self, open: OpenJob) {
        info!("Leaving job {} ({})", open.session.job_id(), open.channel.namespace());
        self.reference
            .cache()
            .remove(&CacheKey::Job(open.session.job_id().to_string()));
        open.session.close();
        open.handler.abort();
    }

    /// Close the open job and its channel
    pub fn leave_job(&self) {
        if let Some(open) = self.job.lock().take() {
            self.teardown(open);
        }
    }

    /// Connect the global channel unless already connected
    pub fn connect_global(&self) {
        let mut global = self.global.lock();
        if global.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (channel, events) = SocketChannel::spawn(
            socket_url(&self.config.ws_url),
            ROOT_NAMESPACE.to_string(),
            self.backoff(),
            shutdown_rx,
        );
        let handler = tokio::spawn(GlobalEventHandler::new(self.reference.cache().clone()).run(events));
        let reference = self.reference.clone();
        tokio::spawn(async move { reference.prefetch_downloads().await });
        *global = Some(GlobalChannel {
            shutdown_tx,
            channel,
            handler,
        });
        info!("Connecting global channel");
    }

    pub fn leave_global(&self) {
        if let Some(global) = self.global.lock().take() {
            let _ = global.shutdown_tx.send(());
            global.handler.abort();
            info!("Left global channel ({})", global.channel.namespace());
        }
    }

    pub fn is_global_connected(&self) -> bool {
        self.global
            .lock()
            .as_ref()
            .map_or(false, |global| !global.channel.is_finished())
    }

    /// Tear everything down
    pub fn shutdown(&self) {
        self.leave_job();
        self.leave_global();
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::cache::{Backend, DatasetListing};
    use crate::model::status::{Clustering, Lens, Linkset};
    use crate::model::{DatasetRef, EntityTypeSelection, Job, Methods, SpecRecord, Timestamp};
    use crate::session::tests::{job, MemorySource};
    use async_trait::async_trait;

    struct NoReference;

    #[async_trait]
    impl ReferenceSource for NoReference {
        async fn fetch_methods(&self) -> ApiResult<Methods> {
            Ok(Methods::default())
        }

        async fn fetch_linksets(&self, _job_id: &str) -> ApiResult<Vec<Linkset>> {
            Ok(Vec::new())
        }

        async fn fetch_lenses(&self, _job_id: &str) -> ApiResult<Vec<Lens>> {
            Ok(Vec::new())
        }

        async fn fetch_clusterings(&self, _job_id: &str) -> ApiResult<Vec<Clustering>> {
            Ok(Vec::new())
        }

        async fn fetch_datasets(&self, _backend: Backend, _endpoint: &str) -> ApiResult<DatasetListing> {
            Ok(DatasetListing::new())
        }

        async fn fetch_downloads(&self, _backend: Backend) -> ApiResult<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
    }

    fn registry(initial: Job) -> (Arc<MemorySource>, ActiveJob) {
        let source = Arc::new(MemorySource::new(initial));
        // Nothing listens here; channels just keep retrying in the background
        let config = ClientConfig::new("http://127.0.0.1:9");
        (source.clone(), ActiveJob::with_sources(config, source, Arc::new(NoReference)))
    }

    #[tokio::test]
    async fn opening_the_same_job_reuses_the_session() {
        let (_, active) = registry(job("2024-03-01T11:00:00.000Z"));
        let first = active.open_job("job1").await.unwrap();
        let second = active.open_job("job1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(active.reference().cache().contains(&CacheKey::Job("job1".into())));
        active.shutdown();
        assert!(first.is_closed());
    }

    #[tokio::test]
    async fn opening_another_job_closes_the_previous_one() {
        let (source, active) = registry(job("2024-03-01T11:00:00.000Z"));
        let first = active.open_job("job1").await.unwrap();

        let mut other = job("2024-03-01T11:00:00.000Z");
        other.job_id = "job2".into();
        *source.job.lock() = other;

        let second = active.open_job("job2").await.unwrap();
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(active.session().map(|s| s.job_id().to_string()), Some("job2".to_string()));

        active.leave_job();
        assert!(second.is_closed());
        assert!(!active.reference().cache().contains(&CacheKey::Job("job2".into())));
        assert!(active.session().is_none());
    }

    #[tokio::test]
    async fn opening_a_job_loads_its_dataset_listings() {
        let mut initial = job("2024-03-01T11:00:00.000Z");
        let mut ets = EntityTypeSelection::scaffold(1, Timestamp::new("t1"), 0);
        ets.dataset = Some(DatasetRef::sparql("https://example.org/sparql", "Person"));
        initial.specs.entity_type_selections = vec![ets];
        let (_, active) = registry(initial);

        active.open_job("job1").await.unwrap();
        let key = CacheKey::Datasets(Backend::Sparql, "https://example.org/sparql".into());
        assert!(active.reference().cache().contains(&key));
        active.shutdown();
    }

    #[tokio::test]
    async fn failed_open_leaves_nothing_behind() {
        let (_, active) = registry(job("2024-03-01T11:00:00.000Z"));
        assert!(active.open_job("missing").await.is_err());
        assert!(active.session().is_none());
    }

    #[tokio::test]
    async fn global_channel_connects_once() {
        let (_, active) = registry(job("2024-03-01T11:00:00.000Z"));
        active.connect_global();
        active.connect_global();
        assert!(active.is_global_connected());
        active.leave_global();
        assert!(!active.is_global_connected());
    }
}
