//! Typed server events of the job and global namespaces.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::protocol::ProtocolResult;
use crate::model::status::{
    AlignmentDelete, AlignmentUpdate, ClusteringDelete, ClusteringUpdate, SparqlDatasetUpdate, SparqlStatusUpdate,
    TimbuctooStatusUpdate,
};
use crate::model::JobUpdate;

/// Events on the namespace of one job
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    JobUpdate(JobUpdate),
    AlignmentUpdate(AlignmentUpdate),
    ClusteringUpdate(ClusteringUpdate),
    AlignmentDelete(AlignmentDelete),
    ClusteringDelete(ClusteringDelete),
}

/// Events on the root namespace
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalEvent {
    SparqlLoadUpdate(SparqlDatasetUpdate),
    SparqlStatusUpdate(SparqlStatusUpdate),
    TimbuctooStatusUpdate(TimbuctooStatusUpdate),
    SparqlUpdate(Value),
    TimbuctooUpdate(Value),
    SparqlLoadDelete(SparqlDatasetUpdate),
    SparqlDelete,
    TimbuctooDelete,
    ExtensionUpdate,
}

fn payload<T: DeserializeOwned>(data: Value) -> ProtocolResult<T> {
    Ok(serde_json::from_value(data)?)
}

impl JobEvent {
    /// `Ok(None)` for events this client does not handle
    pub fn parse(name: &str, data: Value) -> ProtocolResult<Option<Self>> {
        let event = match name {
            "job_update" => JobEvent::JobUpdate(payload(data)?),
            "alignment_update" => JobEvent::AlignmentUpdate(payload(data)?),
            "clustering_update" => JobEvent::ClusteringUpdate(payload(data)?),
            "alignment_delete" => JobEvent::AlignmentDelete(payload(data)?),
            "clustering_delete" => JobEvent::ClusteringDelete(payload(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl GlobalEvent {
    /// `Ok(None)` for events this client does not handle
    pub fn parse(name: &str, data: Value) -> ProtocolResult<Option<Self>> {
        let event = match name {
            "sparql_load_update" => GlobalEvent::SparqlLoadUpdate(payload(data)?),
            "sparql_status_update" => GlobalEvent::SparqlStatusUpdate(payload(data)?),
            "timbuctoo_status_update" => GlobalEvent::TimbuctooStatusUpdate(payload(data)?),
            "sparql_update" => GlobalEvent::SparqlUpdate(data),
            "timbuctoo_update" => GlobalEvent::TimbuctooUpdate(data),
            "sparql_load_delete" => GlobalEvent::SparqlLoadDelete(payload(data)?),
            "sparql_delete" => GlobalEvent::SparqlDelete,
            "timbuctoo_delete" => GlobalEvent::TimbuctooDelete,
            "extension_update" => GlobalEvent::ExtensionUpdate,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpecType;
    use serde_json::json;

    #[test]
    fn job_update_flags_default_to_false() {
        let data = json!({
            "job_id": "job1",
            "updated_at": "2024-03-01T12:00:00.000Z",
            "is_linkset_specs_update": true
        });
        let Some(JobEvent::JobUpdate(update)) = JobEvent::parse("job_update", data).unwrap() else {
            panic!("expected a job update");
        };
        assert!(update.is_linkset_specs_update);
        assert!(!update.is_views_update);
    }

    #[test]
    fn alignment_events() {
        let data = json!({"job_id": "job1", "spec_type": "lens", "spec_id": 2, "status": "done", "status_message": null});
        let event = JobEvent::parse("alignment_update", data).unwrap();
        assert!(matches!(event, Some(JobEvent::AlignmentUpdate(ref u)) if u.spec_type == SpecType::Lens));

        let broken = JobEvent::parse("alignment_delete", json!({"job_id": "job1"}));
        assert!(broken.is_err());
    }

    #[test]
    fn unknown_events_are_none() {
        assert_eq!(JobEvent::parse("whatever", Value::Null).unwrap(), None);
        assert_eq!(GlobalEvent::parse("job_update", Value::Null).unwrap(), None);
    }

    #[test]
    fn global_events() {
        assert_eq!(
            GlobalEvent::parse("extension_update", Value::Null).unwrap(),
            Some(GlobalEvent::ExtensionUpdate)
        );
        let load = GlobalEvent::parse(
            "sparql_load_delete",
            json!({"sparql_endpoint": "https://example.org/sparql"}),
        )
        .unwrap();
        assert!(matches!(load, Some(GlobalEvent::SparqlLoadDelete(ref u)) if u.status.is_none()));

        let download = json!({"sparql_endpoint": "e", "entity_type_id": "P"});
        assert_eq!(
            GlobalEvent::parse("sparql_update", download.clone()).unwrap(),
            Some(GlobalEvent::SparqlUpdate(download))
        );
    }
}
