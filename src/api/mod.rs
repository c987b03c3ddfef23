//! HTTP surface of the Lenticular Lens server.
//!
//! The sync engine and the caches only see the [`JobSource`] and
//! [`ReferenceSource`] traits; [`JobApi`] implements both over `reqwest`.

mod client;
mod review;

pub use client::JobApi;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::cache::{Backend, DatasetListing};
use crate::model::status::{Clustering, Lens, Linkset};
use crate::model::{Job, JobUpdateData, Methods};

/// Errors raised by API calls
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{action} failed with status {status}")]
    Status { action: String, status: u16 },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(err) => err.status().map(|status| status.as_u16()),
            ApiError::Decode(_) => None,
        }
    }
}

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// How the server took a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// HTTP 400: the server refused the body but is expected to have
    /// reported the problem elsewhere. Callers proceed as if saved.
    SoftRejected,
}

/// Result of asking the server to run a linkset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Ok,
    /// Results already exist; rerun with `restart` to replace them
    Exists,
    Error,
}

/// Where the authoritative job document comes from
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_job(&self, job_id: &str) -> ApiResult<Job>;

    async fn save_job(&self, update: &JobUpdateData) -> ApiResult<SaveOutcome>;
}

/// Read-only collections kept in the query cache
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_methods(&self) -> ApiResult<Methods>;

    async fn fetch_linksets(&self, job_id: &str) -> ApiResult<Vec<Linkset>>;

    async fn fetch_lenses(&self, job_id: &str) -> ApiResult<Vec<Lens>>;

    async fn fetch_clusterings(&self, job_id: &str) -> ApiResult<Vec<Clustering>>;

    /// Datasets behind one SPARQL endpoint or Timbuctoo GraphQL endpoint
    async fn fetch_datasets(&self, backend: Backend, endpoint: &str) -> ApiResult<DatasetListing>;

    async fn fetch_downloads(&self, backend: Backend) -> ApiResult<Vec<Value>>;
}
