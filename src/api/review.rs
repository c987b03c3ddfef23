//! Reviewing the results of a job: links and their validation, clusters,
//! entity samples and the job listing.

use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ApiResult, JobApi};
use crate::model::review::{
    number_page, Cluster, ClusterFilter, ClusterGraph, ClustersTotals, FormFields, JobListing, Link, LinkFilter,
    LinksTotals, Sample, Validation, CLUSTERS_PAGE_SIZE, LINKS_PAGE_SIZE, SAMPLES_PAGE_SIZE,
};
use crate::model::{SpecId, SpecType};

#[derive(Deserialize)]
struct SampleTotal {
    total: u64,
}

fn multipart(fields: FormFields) -> Form {
    fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value))
}

/// Fields addressing a single link
fn single_link(source: &str, target: &str) -> FormFields {
    vec![
        ("apply_filters", "false".to_string()),
        ("source", source.to_string()),
        ("target", target.to_string()),
    ]
}

fn spec_path(job_id: &str, spec_type: SpecType, spec_id: SpecId, rest: &str) -> String {
    format!("/job/{}/{}/{}/{}", job_id, spec_type, spec_id, rest)
}

impl JobApi {
    async fn post_form<T: DeserializeOwned>(&self, path: &str, fields: FormFields, action: &str) -> ApiResult<T> {
        let response = self.http().post(self.url(path)).multipart(multipart(fields)).send().await?;
        Self::read_json(response, action).await
    }

    async fn post_form_unit(&self, path: &str, fields: FormFields, action: &str) -> ApiResult<()> {
        let response = self.http().post(self.url(path)).multipart(multipart(fields)).send().await?;
        Self::checked(response, action)?;
        Ok(())
    }

    /// Jobs visible to the current user
    pub async fn list_jobs(&self) -> ApiResult<Vec<JobListing>> {
        self.get_json("/job/list", "Fetching all available jobs").await
    }

    /// One page of links of a linkset or lens, numbered from 1
    pub async fn links(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        filter: &LinkFilter,
        page: u32,
    ) -> ApiResult<Vec<Link>> {
        let mut links: Vec<Link> = self
            .post_form(
                &spec_path(job_id, spec_type, spec_id, "links"),
                filter.links_form(true, Some("multiple"), Some(page)),
                &format!("Fetching links of {} {}", spec_type, spec_id),
            )
            .await?;
        number_page(&mut links, page, LINKS_PAGE_SIZE, |link| &mut link.count);
        Ok(links)
    }

    pub async fn links_totals(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        filter: &LinkFilter,
        apply_filters: bool,
    ) -> ApiResult<LinksTotals> {
        self.post_form(
            &spec_path(job_id, spec_type, spec_id, "links/totals"),
            filter.totals_form(apply_filters),
            &format!("Fetching link totals of {} {}", spec_type, spec_id),
        )
        .await
    }

    /// Set the review state of a single link
    pub async fn validate_link(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        source: &str,
        target: &str,
        validation: Validation,
    ) -> ApiResult<()> {
        let mut fields = vec![("validation", validation.to_string())];
        fields.extend(single_link(source, target));
        self.post_form_unit(
            &spec_path(job_id, spec_type, spec_id, "validate"),
            fields,
            &format!("Validating a link of {} {}", spec_type, spec_id),
        )
        .await?;
        debug!("Marked link {} -> {} as {}", source, target, validation);
        Ok(())
    }

    /// Set the review state of every link matching `filter`
    pub async fn validate_selection(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        filter: &LinkFilter,
        validation: Validation,
    ) -> ApiResult<()> {
        let mut fields = filter.links_form(true, None, None);
        fields.push(("validation", validation.to_string()));
        self.post_form_unit(
            &spec_path(job_id, spec_type, spec_id, "validate"),
            fields,
            &format!("Validating the link selection of {} {}", spec_type, spec_id),
        )
        .await?;
        info!("Marked selected links of {} {} as {}", spec_type, spec_id, validation);
        Ok(())
    }

    pub async fn motivate_link(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        source: &str,
        target: &str,
        motivation: &str,
    ) -> ApiResult<()> {
        let mut fields = vec![("motivation", motivation.to_string())];
        fields.extend(single_link(source, target));
        self.post_form_unit(
            &spec_path(job_id, spec_type, spec_id, "motivate"),
            fields,
            &format!("Motivating a link of {} {}", spec_type, spec_id),
        )
        .await
    }

    pub async fn motivate_selection(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        filter: &LinkFilter,
        motivation: &str,
    ) -> ApiResult<()> {
        let mut fields = filter.links_form(true, None, None);
        fields.push(("motivation", motivation.to_string()));
        self.post_form_unit(
            &spec_path(job_id, spec_type, spec_id, "motivate"),
            fields,
            &format!("Motivating the link selection of {} {}", spec_type, spec_id),
        )
        .await
    }

    /// One page of clusters. A second, filtered listing supplies the
    /// filtered link counts and sizes.
    pub async fn clusters(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        filter: &ClusterFilter,
        page: u32,
    ) -> ApiResult<Vec<Cluster>> {
        let path = spec_path(job_id, spec_type, spec_id, "clusters");
        let action = format!("Fetching clusters of {} {}", spec_type, spec_id);
        let (with_properties, filtered) = tokio::join!(
            self.post_form::<Vec<Cluster>>(&path, filter.clusters_form(false, "multiple", Some(page)), &action),
            self.post_form::<Vec<Cluster>>(&path, filter.clusters_form(true, "none", Some(page)), &action),
        );
        let (mut clusters, filtered) = (with_properties?, filtered?);

        join_filtered(&mut clusters, &filtered);
        number_page(&mut clusters, page, CLUSTERS_PAGE_SIZE, |cluster| &mut cluster.count);
        Ok(clusters)
    }

    pub async fn clusters_totals(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        filter: &ClusterFilter,
        apply_filters: bool,
    ) -> ApiResult<ClustersTotals> {
        self.post_form(
            &spec_path(job_id, spec_type, spec_id, "clusters/totals"),
            filter.totals_form(apply_filters),
            &format!("Fetching cluster totals of {} {}", spec_type, spec_id),
        )
        .await
    }

    pub async fn cluster_graph(
        &self,
        job_id: &str,
        spec_type: SpecType,
        spec_id: SpecId,
        cluster_id: i64,
    ) -> ApiResult<ClusterGraph> {
        self.get_json(
            &spec_path(job_id, spec_type, spec_id, &format!("cluster/{}/graph", cluster_id)),
            &format!("Fetching graph of cluster {}", cluster_id),
        )
        .await
    }

    /// One page of entities of an entity-type selection; `invert` lists the
    /// entities the filter excludes
    pub async fn samples(&self, job_id: &str, ets_id: SpecId, invert: bool, page: u32) -> ApiResult<Vec<Sample>> {
        let query = [
            ("invert", invert.to_string()),
            ("limit", SAMPLES_PAGE_SIZE.to_string()),
            ("offset", (SAMPLES_PAGE_SIZE * page).to_string()),
        ];
        let mut samples: Vec<Sample> = self
            .get_json_with(
                &format!("/job/{}/entity_type_selection/{}", job_id, ets_id),
                &query,
                &format!("Fetching samples of entity-type selection {}", ets_id),
            )
            .await?;
        number_page(&mut samples, page, SAMPLES_PAGE_SIZE, |sample| &mut sample.count);
        Ok(samples)
    }

    pub async fn sample_total(&self, job_id: &str, ets_id: SpecId) -> ApiResult<u64> {
        let total: SampleTotal = self
            .get_json(
                &format!("/job/{}/entity_type_selection_total/{}", job_id, ets_id),
                &format!("Fetching sample total of entity-type selection {}", ets_id),
            )
            .await?;
        Ok(total.total)
    }
}

/// Copy filtered counts onto the unfiltered listing. Clusters missing from
/// the filtered listing have nothing left under the filter.
fn join_filtered(clusters: &mut [Cluster], filtered: &[Cluster]) {
    for cluster in clusters {
        match filtered.iter().find(|f| f.id == cluster.id) {
            Some(matching) => {
                cluster.links_filtered = matching.links;
                cluster.size_filtered = matching.size;
            }
            None => {
                cluster.links_filtered = LinksTotals::default();
                cluster.size_filtered = 0;
            }
        }
    }
}
