//! `reqwest` implementation of the job API.

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ApiError, ApiResult, JobSource, ReferenceSource, RunOutcome, SaveOutcome};
use crate::cache::{Backend, DatasetListing};
use crate::config::ClientConfig;
use crate::model::status::{Clustering, Lens, Linkset};
use crate::model::{Job, JobMetadata, JobUpdateData, Methods, SpecId, SpecType};

/// HTTP client for one Lenticular Lens server
#[derive(Debug, Clone)]
pub struct JobApi {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreatedJob {
    job_id: String,
}

#[derive(Deserialize)]
struct RunRejection {
    result: Option<String>,
}

impl JobApi {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(super) fn http(&self) -> &Client {
        &self.client
    }

    pub(super) fn checked(response: Response, action: impl Into<String>) -> ApiResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status {
                action: action.into(),
                status: response.status().as_u16(),
            })
        }
    }

    pub(super) async fn get_json<T: DeserializeOwned>(&self, path: &str, action: &str) -> ApiResult<T> {
        self.get_json_with(path, &[], action).await
    }

    pub(super) async fn get_json_with<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        action: &str,
    ) -> ApiResult<T> {
        let response = self.client.get(self.url(path)).query(query).send().await?;
        Self::read_json(response, action).await
    }

    pub(super) async fn read_json<T: DeserializeOwned>(response: Response, action: &str) -> ApiResult<T> {
        let response = Self::checked(response, action)?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_update(&self, update: &JobUpdateData) -> ApiResult<SaveOutcome> {
        let response = self.client.post(self.url("/job/update")).json(update).send().await?;

        match response.status() {
            status if status.is_success() => Ok(SaveOutcome::Saved),
            StatusCode::BAD_REQUEST => {
                warn!("Server rejected update of job {} as invalid", update.job_id);
                Ok(SaveOutcome::SoftRejected)
            }
            status => Err(ApiError::Status {
                action: format!("Saving job {}", update.job_id),
                status: status.as_u16(),
            }),
        }
    }

    /// Save title, description and link only
    pub async fn update_job_metadata(&self, job_id: &str, metadata: JobMetadata) -> ApiResult<SaveOutcome> {
        self.post_update(&JobUpdateData::metadata(job_id, metadata)).await
    }

    /// Create a job and return its id
    pub async fn create_job(&self, title: &str, description: &str, link: Option<&str>) -> ApiResult<String> {
        let mut form = Form::new()
            .text("job_title", title.to_string())
            .text("job_description", description.to_string());
        if let Some(link) = link.filter(|link| !link.is_empty()) {
            form = form.text("job_link", link.to_string());
        }

        let response = self.client.post(self.url("/job/create")).multipart(form).send().await?;
        let response = Self::checked(response, "Creating a job")?;
        let created: CreatedJob = serde_json::from_slice(&response.bytes().await?)?;

        info!("Created job {}", created.job_id);
        Ok(created.job_id)
    }

    pub async fn delete_job(&self, job_id: &str) -> ApiResult<()> {
        let response = self.client.delete(self.url(&format!("/job/{}", job_id))).send().await?;
        Self::checked(response, format!("Deleting job {}", job_id))?;
        info!("Deleted job {}", job_id);
        Ok(())
    }

    /// Ask the server to compute linkset `spec_id`
    pub async fn run_linkset(&self, job_id: &str, spec_id: SpecId, restart: bool) -> ApiResult<RunOutcome> {
        let form = Form::new().text("restart", restart.to_string());
        let response = self
            .client
            .post(self.url(&format!("/job/{}/run/linkset/{}", job_id, spec_id)))
            .multipart(form)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(RunOutcome::Ok);
        }
        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.bytes().await?;
            let rejection: Option<RunRejection> = serde_json::from_slice(&body).ok();
            if rejection.and_then(|r| r.result).as_deref() == Some("exists") {
                return Ok(RunOutcome::Exists);
            }
        }
        Ok(RunOutcome::Error)
    }

    /// Ask the server to cluster the links of a linkset or lens
    pub async fn run_clustering(&self, job_id: &str, spec_type: SpecType, spec_id: SpecId) -> ApiResult<bool> {
        let response = self
            .client
            .post(self.url(&format!("/job/{}/run_clustering/{}/{}", job_id, spec_type, spec_id)))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl JobSource for JobApi {
    async fn fetch_job(&self, job_id: &str) -> ApiResult<Job> {
        debug!("Fetching job {}", job_id);
        self.get_json(&format!("/job/{}", job_id), &format!("Fetching job {}", job_id))
            .await
    }

    async fn save_job(&self, update: &JobUpdateData) -> ApiResult<SaveOutcome> {
        self.post_update(update).await
    }
}

#[async_trait]
impl ReferenceSource for JobApi {
    async fn fetch_methods(&self) -> ApiResult<Methods> {
        let raw: Value = self.get_json("/methods", "Fetching available methods").await?;
        Ok(Methods::from_value(raw)?)
    }

    async fn fetch_linksets(&self, job_id: &str) -> ApiResult<Vec<Linkset>> {
        self.get_json(&format!("/job/{}/linksets", job_id), &format!("Fetching linksets of job {}", job_id))
            .await
    }

    async fn fetch_lenses(&self, job_id: &str) -> ApiResult<Vec<Lens>> {
        self.get_json(&format!("/job/{}/lenses", job_id), &format!("Fetching lenses of job {}", job_id))
            .await
    }

    async fn fetch_clusterings(&self, job_id: &str) -> ApiResult<Vec<Clustering>> {
        self.get_json(
            &format!("/job/{}/clusterings", job_id),
            &format!("Fetching clusterings of job {}", job_id),
        )
        .await
    }

    async fn fetch_datasets(&self, backend: Backend, endpoint: &str) -> ApiResult<DatasetListing> {
        if endpoint.is_empty() {
            return Ok(DatasetListing::new());
        }
        let param = match backend {
            Backend::Sparql => "sparql_endpoint",
            Backend::Timbuctoo => "graphql_endpoint",
        };
        self.get_json_with(
            &format!("/datasets/{}", backend),
            &[(param, endpoint.to_string())],
            &format!("Fetching {} datasets of {}", backend, endpoint),
        )
        .await
    }

    async fn fetch_downloads(&self, backend: Backend) -> ApiResult<Vec<Value>> {
        self.get_json(
            &format!("/datasets/{}/downloads", backend),
            &format!("Fetching {} downloads", backend),
        )
        .await
    }
}
