//! View records and the routine that keeps their per-dataset scaffolding
//! aligned with the datasets a linkset or lens actually references.

use tracing::{debug, warn};

use super::{SpecStore, StoreResult};
use crate::model::{DatasetRef, EntityTypeSelection, SpecId, SpecType, Timestamp, View, ViewFilter, ViewProperty};

/// What [`SpecStore::update_ets`] did to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewsUpdate {
    Created,
    Changed,
    Unchanged,
}

impl SpecStore<View> {
    /// Prepend an empty view for `(id, kind)`
    pub fn add_view(&mut self, id: SpecId, kind: SpecType) {
        self.prepend(View::empty(id, kind));
    }

    /// Copy the view of `(id, kind)` under `new_id`, if there is one
    pub fn duplicate_view(&mut self, id: SpecId, kind: SpecType, new_id: SpecId) -> bool {
        if !self.contains((id, kind)) {
            return false;
        }
        self.duplicate_with((id, kind), |copy| {
            copy.id = new_id;
            copy.created = Timestamp::now();
        })
        .is_ok()
    }

    /// Remove the view of `(id, kind)`; a missing view is not an error
    pub fn delete_view(&mut self, id: SpecId, kind: SpecType) {
        if self.contains((id, kind)) {
            let _ = self.delete((id, kind));
        }
    }

    pub fn update_view<F>(&mut self, id: SpecId, kind: SpecType, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut View),
    {
        self.update((id, kind), mutate)
    }

    /// Align the `properties` and `filters` of the view for `(id, kind)`
    /// with the distinct datasets of the given entity-type selections.
    ///
    /// Entries for datasets no longer referenced are dropped, duplicate
    /// entries collapse to the first one, and every referenced dataset
    /// without an entry gets an empty scaffold appended. Running it again
    /// with the same input changes nothing.
    pub fn update_ets(
        &mut self,
        id: SpecId,
        kind: SpecType,
        ets_ids: &[SpecId],
        selections: &[EntityTypeSelection],
    ) -> ViewsUpdate {
        let datasets = resolve_datasets(ets_ids, selections);

        let (mut view, existing) = match self.get((id, kind)) {
            Some(view) => (view.clone(), Some(view.clone())),
            None => (View::empty(id, kind), None),
        };

        align(&mut view.properties, &datasets, |entry| &entry.dataset, ViewProperty::scaffold);
        align(&mut view.filters, &datasets, |entry| &entry.dataset, ViewFilter::scaffold);

        match existing {
            None => {
                debug!("Created view for {} {} with {} datasets", kind, id, datasets.len());
                self.prepend(view);
                ViewsUpdate::Created
            }
            Some(existing) if existing == view => ViewsUpdate::Unchanged,
            Some(_) => {
                debug!("Realigned view for {} {} to {} datasets", kind, id, datasets.len());
                match self.update((id, kind), |current| *current = view) {
                    Ok(()) => ViewsUpdate::Changed,
                    Err(_) => ViewsUpdate::Unchanged,
                }
            }
        }
    }
}

/// Distinct dataset references of the given selections, in id order.
/// Selections without a dataset are skipped.
fn resolve_datasets(ets_ids: &[SpecId], selections: &[EntityTypeSelection]) -> Vec<DatasetRef> {
    let mut datasets: Vec<DatasetRef> = Vec::new();
    for ets_id in ets_ids {
        let Some(selection) = selections.iter().find(|ets| ets.id == *ets_id) else {
            warn!("View references unknown entity-type selection {}", ets_id);
            continue;
        };
        if let Some(dataset) = &selection.dataset {
            if !datasets.contains(dataset) {
                datasets.push(dataset.clone());
            }
        }
    }
    datasets
}

fn align<E, D, S>(entries: &mut Vec<E>, datasets: &[DatasetRef], dataset_of: D, scaffold: S)
where
    D: Fn(&E) -> &DatasetRef,
    S: Fn(DatasetRef) -> E,
{
    let mut kept: Vec<DatasetRef> = Vec::new();
    entries.retain(|entry| {
        let dataset = dataset_of(entry);
        if datasets.contains(dataset) && !kept.contains(dataset) {
            kept.push(dataset.clone());
            true
        } else {
            false
        }
    });

    for dataset in datasets {
        if !kept.contains(dataset) {
            entries.push(scaffold(dataset.clone()));
            kept.push(dataset.clone());
        }
    }
}
