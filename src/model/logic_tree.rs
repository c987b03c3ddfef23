//! Recursive logic trees used by filters, matching methods and lens specs.
//!
//! On the wire a group is an object with a `type` and an array under the
//! children key (`conditions` or `elements`), plus optional group
//! parameters such as `threshold`. Anything else is a leaf. In memory the
//! two cases are explicit variants.

use serde::de::{DeserializeOwned, Error as DeError};
use serde::ser::{Error as SerError, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// Names the JSON key under which a group keeps its children
pub trait ChildrenKey {
    const NAME: &'static str;
}

/// Children stored under `conditions` (filters, matching methods)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionsKey;

impl ChildrenKey for ConditionsKey {
    const NAME: &'static str = "conditions";
}

/// Children stored under `elements` (lens specs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementsKey;

impl ChildrenKey for ElementsKey {
    const NAME: &'static str = "elements";
}

/// Group without extra parameters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoParams {}

/// A node of a logic tree
#[derive(Debug, Clone, PartialEq)]
pub enum LogicTree<E, P, K> {
    Group(LogicGroup<E, P, K>),
    Leaf(E),
}

/// A composite node: a logic operator applied to its children
#[derive(Debug, Clone, PartialEq)]
pub struct LogicGroup<E, P, K> {
    /// Operator name, e.g. `and`, `minimum_t_norm`, `union`
    pub kind: String,
    pub children: Vec<LogicTree<E, P, K>>,
    pub params: P,
    key: PhantomData<K>,
}

impl<E, P, K> LogicGroup<E, P, K> {
    pub fn new(kind: impl Into<String>, children: Vec<LogicTree<E, P, K>>, params: P) -> Self {
        Self {
            kind: kind.into(),
            children,
            params,
            key: PhantomData,
        }
    }
}

impl<E, P: Default, K> LogicTree<E, P, K> {
    /// An empty group of the given operator
    pub fn empty(kind: impl Into<String>) -> Self {
        LogicTree::Group(LogicGroup::new(kind, Vec::new(), P::default()))
    }

    pub fn group(kind: impl Into<String>, children: Vec<LogicTree<E, P, K>>) -> Self {
        LogicTree::Group(LogicGroup::new(kind, children, P::default()))
    }
}

impl<E, P, K> LogicTree<E, P, K> {
    pub fn is_group(&self) -> bool {
        matches!(self, LogicTree::Group(_))
    }

    /// All leaves, depth-first, left to right
    pub fn leaves(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a E>) {
        match self {
            LogicTree::Leaf(element) => out.push(element),
            LogicTree::Group(group) => {
                for child in &group.children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// All groups, pre-order (the root first when it is a group)
    pub fn groups(&self) -> Vec<&LogicGroup<E, P, K>> {
        let mut out = Vec::new();
        self.collect_groups(&mut out);
        out
    }

    fn collect_groups<'a>(&'a self, out: &mut Vec<&'a LogicGroup<E, P, K>>) {
        if let LogicTree::Group(group) = self {
            out.push(group);
            for child in &group.children {
                child.collect_groups(out);
            }
        }
    }

    /// Apply `f` to every group, parents before children
    pub fn for_each_group_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut LogicGroup<E, P, K>),
    {
        if let LogicTree::Group(group) = self {
            f(group);
            for child in &mut group.children {
                child.for_each_group_mut(f);
            }
        }
    }

    /// Apply `f` to every leaf in place
    pub fn for_each_leaf_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut E),
    {
        match self {
            LogicTree::Leaf(element) => f(element),
            LogicTree::Group(group) => {
                for child in &mut group.children {
                    child.for_each_leaf_mut(f);
                }
            }
        }
    }

    /// Rebuild the tree with every leaf transformed, keeping its shape
    pub fn map_leaves<E2, F>(self, f: &mut F) -> LogicTree<E2, P, K>
    where
        F: FnMut(E) -> E2,
    {
        match self {
            LogicTree::Leaf(element) => LogicTree::Leaf(f(element)),
            LogicTree::Group(group) => LogicTree::Group(LogicGroup::new(
                group.kind,
                group
                    .children
                    .into_iter()
                    .map(|child| child.map_leaves(f))
                    .collect(),
                group.params,
            )),
        }
    }
}

impl<E, P, K> LogicTree<E, P, K>
where
    E: DeserializeOwned,
    P: DeserializeOwned,
    K: ChildrenKey,
{
    /// Decode from a JSON value, telling groups and leaves apart by the
    /// presence of the children array
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Object(mut fields)
                if fields.get(K::NAME).map_or(false, Value::is_array) =>
            {
                let children = match fields.remove(K::NAME) {
                    Some(Value::Array(items)) => items
                        .into_iter()
                        .map(Self::from_value)
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                let kind = match fields.remove("type") {
                    Some(Value::String(kind)) => kind,
                    _ => {
                        return Err(<serde_json::Error as DeError>::custom(format!(
                            "logic group under `{}` is missing a string `type`",
                            K::NAME
                        )))
                    }
                };
                let params = serde_json::from_value(Value::Object(fields))?;
                Ok(LogicTree::Group(LogicGroup::new(kind, children, params)))
            }
            other => Ok(LogicTree::Leaf(serde_json::from_value(other)?)),
        }
    }
}

impl<E, P, K> Serialize for LogicTree<E, P, K>
where
    E: Serialize,
    P: Serialize,
    K: ChildrenKey,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LogicTree::Leaf(element) => element.serialize(serializer),
            LogicTree::Group(group) => {
                let params = match serde_json::to_value(&group.params).map_err(S::Error::custom)? {
                    Value::Object(fields) => fields,
                    Value::Null => Map::new(),
                    other => {
                        return Err(S::Error::custom(format!(
                            "logic group parameters must be an object, got {}",
                            other
                        )))
                    }
                };

                let mut map = serializer.serialize_map(Some(2 + params.len()))?;
                map.serialize_entry("type", &group.kind)?;
                map.serialize_entry(K::NAME, &group.children)?;
                for (key, value) in &params {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de, E, P, K> Deserialize<'de> for LogicTree<E, P, K>
where
    E: DeserializeOwned,
    P: DeserializeOwned,
    K: ChildrenKey,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Cond {
        property: Vec<String>,
        #[serde(rename = "type")]
        kind: String,
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Threshold {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f64>,
    }

    type Tree = LogicTree<Cond, Threshold, ConditionsKey>;

    #[test]
    fn leaf_with_type_field_is_not_mistaken_for_group() {
        let value = json!({
            "type": "or",
            "conditions": [
                {"property": ["name"], "type": "not_empty"},
                {"type": "and", "conditions": [], "threshold": 0.5}
            ]
        });

        let tree = Tree::from_value(value).unwrap();
        let groups = tree.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].kind, "or");
        assert_eq!(groups[1].params.threshold, Some(0.5));
        assert_eq!(tree.leaves()[0].kind, "not_empty");
    }

    #[test]
    fn group_serializes_with_children_key_and_params() {
        let tree = Tree::Group(LogicGroup::new(
            "and",
            vec![Tree::Leaf(Cond {
                property: vec!["a".into()],
                kind: "equals".into(),
            })],
            Threshold { threshold: Some(0.0) },
        ));

        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "and",
                "conditions": [{"property": ["a"], "type": "equals"}],
                "threshold": 0.0
            })
        );
        assert_eq!(Tree::from_value(value).unwrap(), tree);
    }

    #[test]
    fn missing_group_type_is_rejected() {
        let result = Tree::from_value(json!({"conditions": []}));
        assert!(result.is_err());
    }

    #[test]
    fn mutation_helpers_visit_every_node() {
        let mut tree = Tree::group(
            "and",
            vec![
                Tree::Leaf(Cond { property: vec![], kind: "x".into() }),
                Tree::group("or", vec![Tree::Leaf(Cond { property: vec![], kind: "y".into() })]),
            ],
        );

        tree.for_each_group_mut(&mut |group| group.params.threshold = Some(1.0));
        tree.for_each_leaf_mut(&mut |leaf| leaf.kind.push('!'));

        assert!(tree.groups().iter().all(|g| g.params.threshold == Some(1.0)));
        let kinds: Vec<_> = tree.leaves().iter().map(|l| l.kind.clone()).collect();
        assert_eq!(kinds, vec!["x!", "y!"]);

        let mapped = tree.map_leaves(&mut |leaf| leaf.kind.len());
        assert_eq!(mapped.leaves(), vec![&2, &2]);
    }
}
