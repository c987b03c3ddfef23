//! Reconciliation of the local working copy with server pushes.
//!
//! - [`merge`]: three-way merge of a single list
//! - [`engine`]: reacts to `job_update` notifications by refetching the
//!   job and merging every list into the session's stores

pub mod engine;
pub mod merge;

pub use engine::{ListMerge, MergeSummary, SkipReason, SyncEngine, SyncOutcome};
pub use merge::{merge_specs, MergeMode, Merged};

use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Errors raised while synchronizing a job
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unable to fetch job {job_id}: {source}")]
    Fetch {
        job_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Unable to save job {job_id}: {source}")]
    Save {
        job_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Job {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_error_display() {
        let err = SyncError::Fetch {
            job_id: "abc".into(),
            source: ApiError::Status {
                action: "Fetching job abc".into(),
                status: 404,
            },
        };
        assert_eq!(
            err.to_string(),
            "Unable to fetch job abc: Fetching job abc failed with status 404"
        );
        assert_eq!(SyncError::Closed("abc".into()).to_string(), "Job abc is closed");
    }
}
