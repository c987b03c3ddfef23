//! The four stores of one open job and the cross-store cascades between
//! specs and their views.

use std::collections::BTreeSet;
use tracing::debug;

use super::{SpecStore, StoreResult, ViewsUpdate};
use crate::model::{
    EntityTypeSelection, JobSpecs, LensSpec, LinksetSpec, ListKind, SpecId, SpecType, View,
};
use crate::specs;

/// Working copy of a job's sub-specifications
#[derive(Debug, Clone, Default)]
pub struct JobStores {
    pub entity_type_selections: SpecStore<EntityTypeSelection>,
    pub linkset_specs: SpecStore<LinksetSpec>,
    pub lens_specs: SpecStore<LensSpec>,
    pub views: SpecStore<View>,
}

impl JobStores {
    pub fn from_specs(specs: JobSpecs) -> Self {
        Self {
            entity_type_selections: SpecStore::new(specs.entity_type_selections),
            linkset_specs: SpecStore::new(specs.linkset_specs),
            lens_specs: SpecStore::new(specs.lens_specs),
            views: SpecStore::new(specs.views),
        }
    }

    /// Deep copy of all four lists
    pub fn snapshot(&self) -> JobSpecs {
        JobSpecs {
            entity_type_selections: self.entity_type_selections.records().to_vec(),
            linkset_specs: self.linkset_specs.records().to_vec(),
            lens_specs: self.lens_specs.records().to_vec(),
            views: self.views.records().to_vec(),
        }
    }

    /// Install one merged list. Only the sync engine calls this.
    pub(crate) fn replace_list(&mut self, list: ListKind, specs: &mut JobSpecs) {
        match list {
            ListKind::EntityTypeSelections => self
                .entity_type_selections
                .replace_all(std::mem::take(&mut specs.entity_type_selections)),
            ListKind::LinksetSpecs => self.linkset_specs.replace_all(std::mem::take(&mut specs.linkset_specs)),
            ListKind::LensSpecs => self.lens_specs.replace_all(std::mem::take(&mut specs.lens_specs)),
            ListKind::Views => self.views.replace_all(std::mem::take(&mut specs.views)),
        }
    }

    // =========================================================================
    // ENTITY-TYPE SELECTIONS
    // =========================================================================

    /// Update a selection; when its dataset changes, the views of every
    /// linkset and lens reaching it are realigned.
    pub fn update_entity_type_selection<F>(&mut self, id: SpecId, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut EntityTypeSelection),
    {
        let before = self.entity_type_selections.get(id).map(|ets| ets.dataset.clone());
        self.entity_type_selections.update(id, mutate)?;
        let after = self.entity_type_selections.get(id).map(|ets| ets.dataset.clone());

        if before != after {
            let linksets: Vec<SpecId> = self
                .linkset_specs
                .records()
                .iter()
                .filter(|spec| spec.sources.contains(&id) || spec.targets.contains(&id))
                .map(|spec| spec.id)
                .collect();
            for linkset_id in linksets {
                self.refresh_linkset_view(linkset_id);
            }
        }
        Ok(())
    }

    // =========================================================================
    // LINKSET SPECS
    // =========================================================================

    pub fn duplicate_linkset_spec(&mut self, id: SpecId) -> StoreResult<SpecId> {
        let new_id = self.linkset_specs.duplicate_by_id(id)?;
        self.views.duplicate_view(id, SpecType::Linkset, new_id);
        Ok(new_id)
    }

    pub fn delete_linkset_spec(&mut self, id: SpecId) -> StoreResult<()> {
        self.linkset_specs.delete_by_id(id)?;
        self.views.delete_view(id, SpecType::Linkset);
        Ok(())
    }

    /// Update a linkset spec; when `sources ∪ targets` changes its view,
    /// and the views of lenses composing it, are realigned.
    pub fn update_linkset_spec<F>(&mut self, id: SpecId, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut LinksetSpec),
    {
        let before = self.linkset_specs.get(id).map(LinksetSpec::entity_type_selection_ids);
        self.linkset_specs.update(id, mutate)?;
        let after = self.linkset_specs.get(id).map(LinksetSpec::entity_type_selection_ids);

        if before != after {
            self.refresh_linkset_view(id);
        }
        Ok(())
    }

    // =========================================================================
    // LENS SPECS
    // =========================================================================

    pub fn duplicate_lens_spec(&mut self, id: SpecId) -> StoreResult<SpecId> {
        let new_id = self.lens_specs.duplicate_by_id(id)?;
        self.views.duplicate_view(id, SpecType::Lens, new_id);
        Ok(new_id)
    }

    pub fn delete_lens_spec(&mut self, id: SpecId) -> StoreResult<()> {
        self.lens_specs.delete_by_id(id)?;
        self.views.delete_view(id, SpecType::Lens);
        Ok(())
    }

    /// Update a lens spec; when the specs it composes change its view, and
    /// the views of lenses composing it, are realigned.
    pub fn update_lens_spec<F>(&mut self, id: SpecId, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut LensSpec),
    {
        let composed = |stores: &Self| {
            stores
                .lens_specs
                .get(id)
                .map(|lens| lens.specs.leaves().into_iter().copied().collect::<Vec<_>>())
        };

        let before = composed(self);
        self.lens_specs.update(id, mutate)?;
        let after = composed(self);

        if before != after {
            self.refresh_lens_view(id);
            for lens_id in self.lenses_composing(SpecType::Lens, id) {
                self.refresh_lens_view(lens_id);
            }
        }
        Ok(())
    }

    // =========================================================================
    // VIEW MAINTENANCE
    // =========================================================================

    /// Realign the view of a linkset and of every lens reaching it
    pub fn refresh_linkset_view(&mut self, id: SpecId) {
        let Some(ets_ids) = self.linkset_specs.get(id).map(LinksetSpec::entity_type_selection_ids) else {
            return;
        };
        let outcome = self
            .views
            .update_ets(id, SpecType::Linkset, &ets_ids, self.entity_type_selections.records());
        if outcome != ViewsUpdate::Unchanged {
            debug!("View of linkset {} {:?}", id, outcome);
        }

        for lens_id in self.lenses_composing(SpecType::Linkset, id) {
            self.refresh_lens_view(lens_id);
        }
    }

    /// Realign the view of one lens from the linksets it reaches
    pub fn refresh_lens_view(&mut self, id: SpecId) {
        if !self.lens_specs.contains(id) {
            return;
        }
        let ets_ids = specs::ets_ids_for_lens(id, self.linkset_specs.records(), self.lens_specs.records());
        let outcome = self
            .views
            .update_ets(id, SpecType::Lens, &ets_ids, self.entity_type_selections.records());
        if outcome != ViewsUpdate::Unchanged {
            debug!("View of lens {} {:?}", id, outcome);
        }
    }

    /// Lenses that reach the given spec, directly or through nested lenses
    fn lenses_composing(&self, kind: SpecType, id: SpecId) -> BTreeSet<SpecId> {
        let lenses = self.lens_specs.records();
        lenses
            .iter()
            .filter(|lens| lens.id != id || kind != SpecType::Lens)
            .filter(|lens| match kind {
                SpecType::Linkset => specs::linkset_specs_in_lens(lens.id, self.linkset_specs.records(), lenses)
                    .iter()
                    .any(|spec| spec.id == id),
                SpecType::Lens => specs::lens_specs_in_lens(lens.id, lenses)
                    .iter()
                    .any(|spec| spec.id == id),
            })
            .map(|lens| lens.id)
            .collect()
    }
}
