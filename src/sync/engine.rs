//! Reacts to `job_update` pushes for the open job.
//!
//! A push that is not newer than the baseline is dropped. Otherwise the job
//! is refetched and, under the session's write lock, every list is merged
//! against the baseline and the current working copy. The fetched job then
//! becomes the new baseline and the merged lists the new working copy.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::merge::{merge_specs, MergeMode, Merged};
use super::{SyncError, SyncResult};
use crate::api::JobSource;
use crate::model::{Job, JobSpecs, JobUpdate, ListKind, Record, Timestamp};
use crate::session::{JobSession, SessionState};

/// Why a notification was not merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Addressed to a different job
    OtherJob,
    /// Not newer than the baseline
    Stale,
    /// The session was closed before the merge could be applied
    Closed,
}

/// Merge outcome of one list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMerge {
    pub list: ListKind,
    pub mode: MergeMode,
    pub kept_local: usize,
    pub discarded_local: usize,
}

/// What one accepted notification did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub lists: Vec<ListMerge>,
    pub metadata_changed: bool,
}

impl MergeSummary {
    pub fn discarded_local(&self) -> usize {
        self.lists.iter().map(|list| list.discarded_local).sum()
    }
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, list) in self.lists.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "{}: {:?} (+{} local, -{} local)",
                list.list.field(),
                list.mode,
                list.kept_local,
                list.discarded_local
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Merged(MergeSummary),
}

/// Keeps one session in step with the server
#[derive(Clone)]
pub struct SyncEngine {
    session: Arc<JobSession>,
    source: Arc<dyn JobSource>,
}

impl SyncEngine {
    pub fn new(session: Arc<JobSession>, source: Arc<dyn JobSource>) -> Self {
        Self { session, source }
    }

    pub fn session(&self) -> &Arc<JobSession> {
        &self.session
    }

    /// A baseline without `updated_at` accepts everything
    fn is_stale(update: &JobUpdate, baseline_updated_at: Option<&Timestamp>) -> bool {
        baseline_updated_at.map_or(false, |current| !update.updated_at.is_after(current))
    }

    /// Process one `job_update` notification
    pub async fn handle_job_update(&self, update: &JobUpdate) -> SyncResult<SyncOutcome> {
        self.apply(update, false).await
    }

    /// After a reconnect every push may have been missed: merge as if all
    /// lists changed. The client clock says nothing about the server's
    /// `updated_at`, so only a fetched copy older than the baseline is
    /// refused.
    pub async fn resync(&self) -> SyncResult<SyncOutcome> {
        self.apply(&JobUpdate::all_changed(self.session.job_id()), true)
            .await
    }

    async fn apply(&self, update: &JobUpdate, forced: bool) -> SyncResult<SyncOutcome> {
        let job_id = self.session.job_id();
        if update.job_id != job_id {
            debug!("Ignoring update for job {} in session of job {}", update.job_id, job_id);
            return Ok(SyncOutcome::Skipped(SkipReason::OtherJob));
        }
        if self.session.is_closed() {
            return Ok(SyncOutcome::Skipped(SkipReason::Closed));
        }
        if !forced && Self::is_stale(update, self.session.baseline_updated_at().as_ref()) {
            debug!("Ignoring stale update of job {} at {}", job_id, update.updated_at);
            return Ok(SyncOutcome::Skipped(SkipReason::Stale));
        }

        info!(
            "Job {} changed at {} (selections: {}, linksets: {}, lenses: {}, views: {})",
            job_id,
            update.updated_at,
            update.is_entity_type_selections_update,
            update.is_linkset_specs_update,
            update.is_lens_specs_update,
            update.is_views_update
        );

        let fresh = self.source.fetch_job(job_id).await.map_err(|source| SyncError::Fetch {
            job_id: job_id.to_string(),
            source,
        })?;

        let outcome = self.session.with_state_mut(|state| {
            // Another merge may have won the race while the fetch was in flight
            let stale = if forced {
                fetched_before_baseline(&fresh, &state.baseline)
            } else {
                Self::is_stale(update, state.baseline.updated_at.as_ref())
            };
            if stale {
                return SyncOutcome::Skipped(SkipReason::Stale);
            }
            SyncOutcome::Merged(reconcile(state, update, fresh))
        });

        match outcome {
            Some(SyncOutcome::Merged(summary)) => {
                info!("Merged job {}: {}", job_id, summary);
                Ok(SyncOutcome::Merged(summary))
            }
            Some(skipped) => Ok(skipped),
            None => {
                debug!("Discarding merge of closed job {}", job_id);
                Ok(SyncOutcome::Skipped(SkipReason::Closed))
            }
        }
    }
}

fn fetched_before_baseline(fresh: &Job, baseline: &Job) -> bool {
    match (&fresh.updated_at, &baseline.updated_at) {
        (Some(fetched), Some(current)) => current.is_after(fetched),
        _ => false,
    }
}

fn merge_list<T: Record>(
    update: &JobUpdate,
    original: &[T],
    saved: &[T],
    unsaved: &[T],
) -> (Vec<T>, ListMerge) {
    let has_unsaved = unsaved != original;
    let Merged {
        records,
        mode,
        kept_local,
        discarded_local,
    } = merge_specs(update.is_update(T::LIST), has_unsaved, original, saved, unsaved);

    (
        records,
        ListMerge {
            list: T::LIST,
            mode,
            kept_local,
            discarded_local,
        },
    )
}

/// Merge all four lists and install the result. Runs under the write lock.
fn reconcile(state: &mut SessionState, update: &JobUpdate, fresh: Job) -> MergeSummary {
    let original = &state.baseline.specs;
    let unsaved = state.stores.snapshot();
    let saved = &fresh.specs;

    let (entity_type_selections, ets) = merge_list(
        update,
        &original.entity_type_selections,
        &saved.entity_type_selections,
        &unsaved.entity_type_selections,
    );
    let (linkset_specs, linksets) = merge_list(
        update,
        &original.linkset_specs,
        &saved.linkset_specs,
        &unsaved.linkset_specs,
    );
    let (lens_specs, lenses) = merge_list(update, &original.lens_specs, &saved.lens_specs, &unsaved.lens_specs);
    let (views, view_merge) = merge_list(update, &original.views, &saved.views, &unsaved.views);

    let mut merged = JobSpecs {
        entity_type_selections,
        linkset_specs,
        lens_specs,
        views,
    };
    for list in ListKind::ALL {
        state.stores.replace_list(list, &mut merged);
    }

    let metadata_changed = fresh.metadata() != state.baseline.metadata();
    state.set_baseline(fresh);

    MergeSummary {
        lists: vec![ets, linksets, lenses, view_merge],
        metadata_changed,
    }
}
