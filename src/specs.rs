//! Helpers over the graph of specs: which linksets and lenses a lens
//! composes, which entity-type selections they reach, and the logic-box
//! type switches applied when fuzzy logic is toggled.

use serde_json::{Map, Number};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::model::records::{
    Fuzzy, ListMatching, MethodConfig, PropertyCondition, SideConditions, SimMethodConfig,
};
use crate::model::status::Linkset;
use crate::model::{
    LensElements, LensSpec, LinksetSpec, MatchingMethodSpec, MatchingMethods, SpecId, SpecRef, SpecType,
};

/// Known t-norms (fuzzy `and`)
pub const T_NORMS: [&str; 6] = [
    "minimum_t_norm",
    "product_t_norm",
    "lukasiewicz_t_norm",
    "drastic_t_norm",
    "nilpotent_minimum",
    "hamacher_product",
];

/// Known s-norms (fuzzy `or`)
pub const S_NORMS: [&str; 6] = [
    "maximum_s_norm",
    "probabilistic_sum",
    "bounded_sum",
    "drastic_s_norm",
    "nilpotent_maximum",
    "einstein_sum",
];

pub fn is_t_norm(kind: &str) -> bool {
    T_NORMS.contains(&kind)
}

pub fn is_s_norm(kind: &str) -> bool {
    S_NORMS.contains(&kind)
}

/// Switch the groups of a matching-method tree between crisp and fuzzy
/// operators.
pub fn update_methods_logic_box_types(methods: &mut MatchingMethods, use_fuzzy_logic: bool) {
    methods.for_each_group_mut(&mut |group| {
        if use_fuzzy_logic {
            match group.kind.as_str() {
                "and" => group.kind = "minimum_t_norm".into(),
                "or" => group.kind = "maximum_s_norm".into(),
                _ => {}
            }
            group.params.threshold = Some(Number::from(0));
        } else {
            if is_t_norm(&group.kind) {
                group.kind = "and".into();
            } else if is_s_norm(&group.kind) {
                group.kind = "or".into();
            }
            group.params.threshold = None;
        }
    });
}

/// Attach or strip the fuzzy aggregator of every lens group. Difference
/// and set-membership groups never carry one.
pub fn update_lens_logic_box_types(elements: &mut LensElements, use_fuzzy_logic: bool) {
    elements.for_each_group_mut(&mut |group| {
        if use_fuzzy_logic && group.kind != "difference" && !group.kind.starts_with("in_set") {
            group.params.s_norm = Some("maximum_s_norm".into());
            group.params.threshold = Some(Number::from(0));
        } else {
            group.params.s_norm = None;
            group.params.threshold = None;
        }
    });
}

fn find_lens(id: SpecId, lens_specs: &[LensSpec]) -> Option<&LensSpec> {
    lens_specs.iter().find(|spec| spec.id == id)
}

/// Lens specs composed by lens `id`, transitively, without duplicates.
/// The lens itself is not included unless it is reachable through a cycle.
pub fn lens_specs_in_lens(id: SpecId, lens_specs: &[LensSpec]) -> Vec<&LensSpec> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut pending: Vec<&LensSpec> = find_lens(id, lens_specs).into_iter().collect();

    while let Some(lens) = pending.pop() {
        for element in lens.specs.leaves() {
            if element.kind != SpecType::Lens || !seen.insert(element.id) {
                continue;
            }
            if let Some(nested) = find_lens(element.id, lens_specs) {
                found.push(nested);
                pending.push(nested);
            }
        }
    }

    found
}

/// Linkset specs referenced by lens `id` or any lens nested in it
pub fn linkset_specs_in_lens<'a>(
    id: SpecId,
    linkset_specs: &'a [LinksetSpec],
    lens_specs: &[LensSpec],
) -> Vec<&'a LinksetSpec> {
    let mut lenses: Vec<&LensSpec> = find_lens(id, lens_specs).into_iter().collect();
    lenses.extend(lens_specs_in_lens(id, lens_specs));

    let mut seen = HashSet::new();
    lenses
        .iter()
        .flat_map(|lens| lens.specs.leaves())
        .filter(|element| element.kind == SpecType::Linkset)
        .filter_map(|element| linkset_specs.iter().find(|spec| spec.id == element.id))
        .filter(|spec| seen.insert(spec.id))
        .collect()
}

/// Every existing spec referenced from any lens, nested references included
pub fn specs_used_in_lenses(lens_specs: &[LensSpec], linkset_specs: &[LinksetSpec]) -> Vec<SpecRef> {
    let mut seen = HashSet::new();
    let mut used = Vec::new();

    for lens in lens_specs {
        let nested = lens_specs_in_lens(lens.id, lens_specs);
        for element in std::iter::once(lens).chain(nested).flat_map(|spec| spec.specs.leaves()) {
            let exists = match element.kind {
                SpecType::Lens => find_lens(element.id, lens_specs).is_some(),
                SpecType::Linkset => linkset_specs.iter().any(|spec| spec.id == element.id),
            };
            if exists && seen.insert(*element) {
                used.push(*element);
            }
        }
    }

    used
}

/// Entity-type selections reached by a lens through its linksets, sorted
pub fn ets_ids_for_lens(id: SpecId, linkset_specs: &[LinksetSpec], lens_specs: &[LensSpec]) -> Vec<SpecId> {
    linkset_specs_in_lens(id, linkset_specs, lens_specs)
        .into_iter()
        .flat_map(|spec| spec.sources.iter().chain(&spec.targets).copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether a linkset that has already been run references the selection
pub fn is_entity_type_used_in_linkset(ets_id: SpecId, linkset_specs: &[LinksetSpec], linksets: &[Linkset]) -> bool {
    let run: HashSet<SpecId> = linksets.iter().map(|linkset| linkset.spec_id).collect();
    linkset_specs.iter().any(|spec| {
        run.contains(&spec.id) && (spec.sources.contains(&ets_id) || spec.targets.contains(&ets_id))
    })
}

fn empty_side(ets_ids: &[SpecId]) -> SideConditions {
    let properties: BTreeMap<SpecId, Vec<PropertyCondition>> = ets_ids
        .iter()
        .filter(|&&id| id >= 0)
        .map(|&id| {
            (
                id,
                vec![PropertyCondition {
                    property: vec![String::new()],
                    transformers: Vec::new(),
                }],
            )
        })
        .collect();

    SideConditions {
        properties,
        transformers: Vec::new(),
    }
}

/// Default matching condition for a linkset with the given sides
pub fn new_matching_condition(sources: &[SpecId], targets: &[SpecId]) -> MatchingMethodSpec {
    MatchingMethodSpec {
        method: MethodConfig {
            name: String::new(),
            config: Map::new(),
        },
        sim_method: SimMethodConfig {
            name: None,
            config: Map::new(),
            normalized: false,
        },
        fuzzy: Fuzzy {
            t_norm: "minimum_t_norm".into(),
            s_norm: "maximum_s_norm".into(),
            threshold: Number::from(0),
        },
        list_matching: ListMatching {
            threshold: Number::from(0),
            is_percentage: false,
        },
        sources: empty_side(sources),
        targets: empty_side(targets),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogicTree, SpecRecord, Timestamp};

    fn linkset(id: SpecId, sources: &[SpecId], targets: &[SpecId]) -> LinksetSpec {
        let mut spec = LinksetSpec::scaffold(id, Timestamp::new(format!("l{}", id)), 0);
        spec.sources = sources.to_vec();
        spec.targets = targets.to_vec();
        spec
    }

    fn lens(id: SpecId, refs: &[(SpecId, SpecType)]) -> LensSpec {
        let mut spec = LensSpec::scaffold(id, Timestamp::new(format!("n{}", id)), 0);
        spec.specs = LensElements::group(
            "union",
            refs.iter()
                .map(|&(id, kind)| LogicTree::Leaf(SpecRef { id, kind }))
                .collect(),
        );
        spec
    }

    #[test]
    fn nested_lenses_resolve_to_their_linksets() {
        let linksets = vec![linkset(1, &[1], &[2]), linkset(2, &[2], &[3]), linkset(3, &[4], &[4])];
        let lenses = vec![
            lens(1, &[(1, SpecType::Linkset), (2, SpecType::Lens)]),
            lens(2, &[(2, SpecType::Linkset), (1, SpecType::Linkset)]),
        ];

        let nested: Vec<_> = lens_specs_in_lens(1, &lenses).iter().map(|l| l.id).collect();
        assert_eq!(nested, vec![2]);

        let reached: Vec<_> = linkset_specs_in_lens(1, &linksets, &lenses).iter().map(|l| l.id).collect();
        assert_eq!(reached, vec![1, 2]);
        assert_eq!(ets_ids_for_lens(1, &linksets, &lenses), vec![1, 2, 3]);
    }

    #[test]
    fn cyclic_lenses_terminate() {
        let lenses = vec![lens(1, &[(2, SpecType::Lens)]), lens(2, &[(1, SpecType::Lens)])];
        let nested: Vec<_> = lens_specs_in_lens(1, &lenses).iter().map(|l| l.id).collect();
        assert_eq!(nested, vec![2, 1]);
        assert_eq!(specs_used_in_lenses(&lenses, &[]).len(), 2);
    }

    #[test]
    fn fuzzy_toggle_rewrites_group_types() {
        let mut methods = MatchingMethods::group("and", vec![MatchingMethods::empty("or")]);
        update_methods_logic_box_types(&mut methods, true);
        let kinds: Vec<_> = methods.groups().iter().map(|g| (g.kind.clone(), g.params.threshold.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                ("minimum_t_norm".to_string(), Some(Number::from(0))),
                ("maximum_s_norm".to_string(), Some(Number::from(0)))
            ]
        );

        update_methods_logic_box_types(&mut methods, false);
        let kinds: Vec<_> = methods.groups().iter().map(|g| (g.kind.clone(), g.params.threshold.clone())).collect();
        assert_eq!(kinds, vec![("and".to_string(), None), ("or".to_string(), None)]);
    }

    #[test]
    fn lens_fuzzy_toggle_skips_difference() {
        let mut elements = LensElements::group("union", vec![LensElements::empty("difference")]);
        update_lens_logic_box_types(&mut elements, true);
        let groups = elements.groups();
        assert_eq!(groups[0].params.s_norm.as_deref(), Some("maximum_s_norm"));
        assert_eq!(groups[1].params.s_norm, None);
    }

    #[test]
    fn run_linksets_mark_their_selections_as_used() {
        let specs = vec![linkset(1, &[5], &[6]), linkset(2, &[7], &[7])];
        let run: Linkset = serde_json::from_value(serde_json::json!({
            "job_id": "j", "spec_id": 1, "status": "done", "status_message": null
        }))
        .unwrap();

        assert!(is_entity_type_used_in_linkset(6, &specs, &[run.clone()]));
        assert!(!is_entity_type_used_in_linkset(7, &specs, &[run]));
    }

    #[test]
    fn new_condition_skips_negative_ids() {
        let condition = new_matching_condition(&[1, -1], &[2]);
        assert_eq!(condition.sources.properties.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(condition.targets.properties[&2][0].property, vec![String::new()]);
        assert_eq!(condition.fuzzy.t_norm, "minimum_t_norm");
    }
}
