//! One open job: the last accepted server snapshot (the baseline) and the
//! four stores holding the local working copy.
//!
//! All reads and writes go through one `RwLock`. Nothing holds the lock
//! across an `.await`; network calls happen before or after it.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::api::{JobSource, SaveOutcome};
use crate::model::{Job, JobSpecs, ListKind, Timestamp};
use crate::store::JobStores;
use crate::sync::{SyncError, SyncResult};

/// Lock-protected state of a session
#[derive(Debug)]
pub(crate) struct SessionState {
    pub baseline: Job,
    pub stores: JobStores,
    /// Bumped every time the baseline is replaced
    pub revision: u64,
}

impl SessionState {
    pub fn set_baseline(&mut self, baseline: Job) {
        self.baseline = baseline;
        self.revision += 1;
    }
}

/// Working state of the currently open job
#[derive(Debug)]
pub struct JobSession {
    job_id: String,
    state: RwLock<SessionState>,
    closed: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl JobSession {
    /// Fetch the job and install it as both baseline and working copy
    pub async fn open(job_id: &str, source: &dyn JobSource) -> SyncResult<Arc<Self>> {
        let job = source.fetch_job(job_id).await.map_err(|source| SyncError::Fetch {
            job_id: job_id.to_string(),
            source,
        })?;

        info!("Opened job {} ({})", job.job_id, job.job_title);
        Ok(Arc::new(Self::from_job(job)))
    }

    pub fn from_job(job: Job) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let stores = JobStores::from_specs(job.specs.clone());
        Self {
            job_id: job.job_id.clone(),
            state: RwLock::new(SessionState {
                baseline: job,
                stores,
                revision: 0,
            }),
            closed: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Copy of the last accepted server snapshot
    pub fn baseline(&self) -> Job {
        self.state.read().baseline.clone()
    }

    pub fn baseline_updated_at(&self) -> Option<Timestamp> {
        self.state.read().baseline.updated_at.clone()
    }

    /// Copy of the current working lists
    pub fn specs(&self) -> JobSpecs {
        self.state.read().stores.snapshot()
    }

    /// Read the stores
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&JobStores) -> R,
    {
        f(&self.state.read().stores)
    }

    /// Edit the stores. Rejected once the session is closed.
    pub fn edit<F, R>(&self, f: F) -> SyncResult<R>
    where
        F: FnOnce(&mut JobStores) -> R,
    {
        let mut state = self.state.write();
        if self.is_closed() {
            return Err(SyncError::Closed(self.job_id.clone()));
        }
        Ok(f(&mut state.stores))
    }

    /// Run `f` under the write lock unless the session is closed
    pub(crate) fn with_state_mut<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut state = self.state.write();
        if self.is_closed() {
            return None;
        }
        Some(f(&mut state))
    }

    /// Lists whose working copy differs from the baseline
    pub fn changed_lists(&self) -> Vec<ListKind> {
        let state = self.state.read();
        state.stores.snapshot().changed_lists(&state.baseline.specs)
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_lists().is_empty()
    }

    /// Send the working copy to the server.
    ///
    /// The baseline is moved to the working copy before the request goes
    /// out so that the save does not show up as pending changes. It is
    /// kept on `Saved` and `SoftRejected`, and restored on error unless a
    /// merge replaced it in the meantime. The working copy is never
    /// touched.
    pub async fn save(&self, source: &dyn JobSource) -> SyncResult<SaveOutcome> {
        let (update, previous, revision) = {
            let mut state = self.state.write();
            if self.is_closed() {
                return Err(SyncError::Closed(self.job_id.clone()));
            }

            let specs = state.stores.snapshot();
            let update = state.baseline.to_update(&specs);
            let mut tentative = state.baseline.clone();
            tentative.specs = specs;

            let previous = std::mem::replace(&mut state.baseline, tentative);
            state.revision += 1;
            (update, previous, state.revision)
        };

        info!("Saving job {}", self.job_id);
        match source.save_job(&update).await {
            Ok(outcome) => {
                match outcome {
                    SaveOutcome::Saved => info!("Saved job {}", self.job_id),
                    SaveOutcome::SoftRejected => warn!("Job {} was not accepted by the server", self.job_id),
                }
                Ok(outcome)
            }
            Err(err) => {
                let mut state = self.state.write();
                if state.revision == revision {
                    state.set_baseline(previous);
                } else {
                    warn!("Baseline of job {} moved on during a failed save; keeping it", self.job_id);
                }
                error!("Saving job {} failed: {}", self.job_id, err);
                Err(SyncError::Save {
                    job_id: self.job_id.clone(),
                    source: err,
                })
            }
        }
    }

    /// Tear down: no edit or merge is applied afterwards
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
            info!("Closed job {}", self.job_id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the session is closed
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{ApiError, ApiResult};
    use crate::model::JobUpdateData;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Server double keeping one job in memory
    pub(crate) struct MemorySource {
        pub job: Mutex<Job>,
        pub saves: Mutex<Vec<JobUpdateData>>,
        pub save_status: Mutex<Option<u16>>,
    }

    impl MemorySource {
        pub fn new(job: Job) -> Self {
            Self {
                job: Mutex::new(job),
                saves: Mutex::new(Vec::new()),
                save_status: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl JobSource for MemorySource {
        async fn fetch_job(&self, job_id: &str) -> ApiResult<Job> {
            let job = self.job.lock().clone();
            if job.job_id != job_id {
                return Err(ApiError::Status {
                    action: format!("Fetching job {}", job_id),
                    status: 404,
                });
            }
            Ok(job)
        }

        async fn save_job(&self, update: &JobUpdateData) -> ApiResult<SaveOutcome> {
            self.saves.lock().push(update.clone());
            match *self.save_status.lock() {
                None => Ok(SaveOutcome::Saved),
                Some(400) => Ok(SaveOutcome::SoftRejected),
                Some(status) => Err(ApiError::Status {
                    action: "Saving job".into(),
                    status,
                }),
            }
        }
    }

    pub(crate) fn job(updated_at: &str) -> Job {
        serde_json::from_value(serde_json::json!({
            "job_id": "job1",
            "job_title": "Persons",
            "job_description": "",
            "job_link": null,
            "created_at": "2024-03-01T10:00:00.000Z",
            "updated_at": updated_at,
            "entity_type_selections": [],
            "linkset_specs": [],
            "lens_specs": [],
            "views": []
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn open_installs_baseline_and_stores() {
        let source = MemorySource::new(job("2024-03-01T11:00:00Z"));
        let session = JobSession::open("job1", &source).await.unwrap();

        assert_eq!(session.job_id(), "job1");
        assert!(!session.has_changes());
        assert!(JobSession::open("other", &source).await.is_err());
    }

    #[tokio::test]
    async fn edits_show_up_as_changes_until_saved() {
        let source = MemorySource::new(job("2024-03-01T11:00:00Z"));
        let session = JobSession::open("job1", &source).await.unwrap();

        session.edit(|stores| stores.linkset_specs.add_new()).unwrap();
        assert_eq!(session.changed_lists(), vec![ListKind::LinksetSpecs]);

        assert_eq!(session.save(&source).await.unwrap(), SaveOutcome::Saved);
        assert!(!session.has_changes());

        let saves = source.saves.lock();
        assert_eq!(saves[0].linkset_specs.as_ref().map(Vec::len), Some(1));
        assert_eq!(saves[0].job_title.as_deref(), Some("Persons"));
    }

    #[tokio::test]
    async fn soft_rejection_counts_as_saved() {
        let source = MemorySource::new(job("2024-03-01T11:00:00Z"));
        *source.save_status.lock() = Some(400);
        let session = JobSession::open("job1", &source).await.unwrap();

        session.edit(|stores| stores.lens_specs.add_new()).unwrap();
        assert_eq!(session.save(&source).await.unwrap(), SaveOutcome::SoftRejected);
        assert!(!session.has_changes());
    }

    #[tokio::test]
    async fn failed_save_rolls_baseline_back_and_keeps_edits() {
        let source = MemorySource::new(job("2024-03-01T11:00:00Z"));
        *source.save_status.lock() = Some(500);
        let session = JobSession::open("job1", &source).await.unwrap();

        session.edit(|stores| stores.entity_type_selections.add_new()).unwrap();
        let edited = session.specs();

        assert!(matches!(session.save(&source).await, Err(SyncError::Save { .. })));
        assert!(session.has_changes());
        assert_eq!(session.specs(), edited);
        assert!(session.baseline().specs.entity_type_selections.is_empty());
    }

    #[tokio::test]
    async fn closed_session_rejects_edits_and_signals_shutdown() {
        let session = JobSession::from_job(job("2024-03-01T11:00:00Z"));
        let mut shutdown = session.subscribe_shutdown();

        session.close();
        session.close();

        assert!(shutdown.recv().await.is_ok());
        assert!(matches!(
            session.edit(|stores| stores.views.len()),
            Err(SyncError::Closed(_))
        ));
    }
}
