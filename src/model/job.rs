//! The persisted job document and the `job_update` notification.

use serde::{Deserialize, Serialize};

use super::records::{EntityTypeSelection, LensSpec, LinksetSpec, View};
use super::timestamp::Timestamp;

/// Which of the four sub-specification lists a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    EntityTypeSelections,
    LinksetSpecs,
    LensSpecs,
    Views,
}

impl ListKind {
    pub const ALL: [ListKind; 4] = [
        ListKind::EntityTypeSelections,
        ListKind::LinksetSpecs,
        ListKind::LensSpecs,
        ListKind::Views,
    ];

    /// Field name in the job document
    pub fn field(&self) -> &'static str {
        match self {
            ListKind::EntityTypeSelections => "entity_type_selections",
            ListKind::LinksetSpecs => "linkset_specs",
            ListKind::LensSpecs => "lens_specs",
            ListKind::Views => "views",
        }
    }
}

/// The four sub-specification lists of a job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSpecs {
    pub entity_type_selections: Vec<EntityTypeSelection>,
    pub linkset_specs: Vec<LinksetSpec>,
    pub lens_specs: Vec<LensSpec>,
    pub views: Vec<View>,
}

impl JobSpecs {
    /// Lists that differ from `other`, in document order
    pub fn changed_lists(&self, other: &JobSpecs) -> Vec<ListKind> {
        let mut changed = Vec::new();
        if self.entity_type_selections != other.entity_type_selections {
            changed.push(ListKind::EntityTypeSelections);
        }
        if self.linkset_specs != other.linkset_specs {
            changed.push(ListKind::LinksetSpecs);
        }
        if self.lens_specs != other.lens_specs {
            changed.push(ListKind::LensSpecs);
        }
        if self.views != other.views {
            changed.push(ListKind::Views);
        }
        changed
    }
}

/// Server-persisted job envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_title: String,
    pub job_description: String,
    pub job_link: Option<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    #[serde(flatten)]
    pub specs: JobSpecs,
}

impl Job {
    pub fn metadata(&self) -> JobMetadata {
        JobMetadata {
            job_title: self.job_title.clone(),
            job_description: self.job_description.clone(),
            job_link: self.job_link.clone(),
        }
    }

    /// Full update body: the metadata of this job with the given lists
    pub fn to_update(&self, specs: &JobSpecs) -> JobUpdateData {
        JobUpdateData {
            job_id: self.job_id.clone(),
            job_title: Some(self.job_title.clone()),
            job_description: Some(self.job_description.clone()),
            job_link: Some(self.job_link.clone()),
            entity_type_selections: Some(specs.entity_type_selections.clone()),
            linkset_specs: Some(specs.linkset_specs.clone()),
            lens_specs: Some(specs.lens_specs.clone()),
            views: Some(specs.views.clone()),
        }
    }
}

/// Editable job metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_title: String,
    pub job_description: String,
    pub job_link: Option<String>,
}

/// Body of `POST /job/update`; absent fields are left untouched server-side.
///
/// `job_link` is doubly optional: `None` omits it, `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobUpdateData {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_link: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type_selections: Option<Vec<EntityTypeSelection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkset_specs: Option<Vec<LinksetSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_specs: Option<Vec<LensSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<View>>,
}

impl JobUpdateData {
    pub fn metadata(job_id: impl Into<String>, metadata: JobMetadata) -> Self {
        Self {
            job_id: job_id.into(),
            job_title: Some(metadata.job_title),
            job_description: Some(metadata.job_description),
            job_link: Some(metadata.job_link),
            ..Default::default()
        }
    }
}

/// Server push telling which parts of a job changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: String,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub is_title_update: bool,
    #[serde(default)]
    pub is_description_update: bool,
    #[serde(default)]
    pub is_link_update: bool,
    #[serde(default)]
    pub is_entity_type_selections_update: bool,
    #[serde(default)]
    pub is_linkset_specs_update: bool,
    #[serde(default)]
    pub is_lens_specs_update: bool,
    #[serde(default)]
    pub is_views_update: bool,
}

impl JobUpdate {
    /// A notification claiming everything changed, stamped now.
    /// Used after a reconnect, when missed pushes must be assumed.
    pub fn all_changed(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            updated_at: Timestamp::now(),
            is_title_update: true,
            is_description_update: true,
            is_link_update: true,
            is_entity_type_selections_update: true,
            is_linkset_specs_update: true,
            is_lens_specs_update: true,
            is_views_update: true,
        }
    }

    pub fn is_update(&self, list: ListKind) -> bool {
        match list {
            ListKind::EntityTypeSelections => self.is_entity_type_selections_update,
            ListKind::LinksetSpecs => self.is_linkset_specs_update,
            ListKind::LensSpecs => self.is_lens_specs_update,
            ListKind::Views => self.is_views_update,
        }
    }

    pub fn is_metadata_update(&self) -> bool {
        self.is_title_update || self.is_description_update || self.is_link_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_json() -> serde_json::Value {
        json!({
            "job_id": "a1b2c3",
            "job_title": "Persons",
            "job_description": "Match persons",
            "job_link": null,
            "created_at": "2024-03-01T10:00:00.000Z",
            "updated_at": "2024-03-01T11:00:00.123456",
            "entity_type_selections": [],
            "linkset_specs": [],
            "lens_specs": [],
            "views": []
        })
    }

    #[test]
    fn job_round_trips_field_names() {
        let job: Job = serde_json::from_value(job_json()).unwrap();
        assert_eq!(job.job_id, "a1b2c3");
        assert_eq!(job.updated_at.as_ref().map(Timestamp::as_str), Some("2024-03-01T11:00:00.123456"));
        assert_eq!(serde_json::to_value(&job).unwrap(), job_json());
    }

    #[test]
    fn metadata_update_omits_lists_but_keeps_null_link() {
        let body = JobUpdateData::metadata(
            "a1b2c3",
            JobMetadata {
                job_title: "New".into(),
                job_description: "".into(),
                job_link: None,
            },
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({"job_id": "a1b2c3", "job_title": "New", "job_description": "", "job_link": null})
        );
    }

    #[test]
    fn notification_flags_default_to_false() {
        let update: JobUpdate = serde_json::from_value(json!({
            "job_id": "a1b2c3",
            "updated_at": "2024-03-01T12:00:00Z",
            "is_views_update": true
        }))
        .unwrap();

        assert!(update.is_update(ListKind::Views));
        assert!(!update.is_update(ListKind::LinksetSpecs));
        assert!(!update.is_metadata_update());
        assert!(ListKind::ALL.iter().all(|&list| JobUpdate::all_changed("x").is_update(list)));
    }
}
