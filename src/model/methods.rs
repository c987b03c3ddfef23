//! Catalog of filter functions, matching methods and transformers served by
//! `GET /methods`.
//!
//! The server sends each catalog as an object plus a separate `*_order`
//! array; both are folded into ordered vectors here.

use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One configurable input of a method or transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Defaults, bounds, choices and the like
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterFunction {
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingMethod {
    pub label: String,
    pub description: String,
    /// `filter`, `similarity` or `normalizer`
    pub kind: String,
    pub order: i64,
    pub items: Vec<(String, ConfigItem)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    pub label: String,
    pub order: i64,
    pub items: Vec<(String, ConfigItem)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Methods {
    pub filter_functions: Vec<(String, FilterFunction)>,
    pub matching_methods: Vec<(String, MatchingMethod)>,
    pub transformers: Vec<(String, Transformer)>,
}

#[derive(Deserialize)]
struct RawMethods {
    filter_functions: Map<String, Value>,
    filter_functions_order: Vec<String>,
    matching_methods: Map<String, Value>,
    matching_methods_order: Vec<String>,
    transformers: Map<String, Value>,
    transformers_order: Vec<String>,
}

#[derive(Deserialize)]
struct RawMatchingMethod {
    label: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    kind: String,
    order: i64,
    #[serde(default)]
    items: Map<String, Value>,
    #[serde(default)]
    items_order: Vec<String>,
}

#[derive(Deserialize)]
struct RawTransformer {
    label: String,
    order: i64,
    #[serde(default)]
    items: Map<String, Value>,
    #[serde(default)]
    items_order: Vec<String>,
}

/// Pick `order` keys out of `entries`, in that order
fn ordered<T: DeserializeOwned>(
    what: &str,
    entries: &mut Map<String, Value>,
    order: &[String],
) -> Result<Vec<(String, T)>, serde_json::Error> {
    order
        .iter()
        .map(|key| -> Result<(String, T), serde_json::Error> {
            let value = entries.remove(key).ok_or_else(|| {
                <serde_json::Error as DeError>::custom(format!("{} `{}` listed in order but missing", what, key))
            })?;
            Ok((key.clone(), serde_json::from_value(value)?))
        })
        .collect()
}

impl Methods {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut raw: RawMethods = serde_json::from_value(value)?;

        let filter_functions = ordered("filter function", &mut raw.filter_functions, &raw.filter_functions_order)?;

        let matching_methods = ordered::<RawMatchingMethod>("matching method", &mut raw.matching_methods, &raw.matching_methods_order)?
            .into_iter()
            .map(|(key, mut method)| -> Result<(String, MatchingMethod), serde_json::Error> {
                let items = ordered("config item", &mut method.items, &method.items_order)?;
                Ok((
                    key,
                    MatchingMethod {
                        label: method.label,
                        description: method.description,
                        kind: method.kind,
                        order: method.order,
                        items,
                    },
                ))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        let transformers = ordered::<RawTransformer>("transformer", &mut raw.transformers, &raw.transformers_order)?
            .into_iter()
            .map(|(key, mut transformer)| -> Result<(String, Transformer), serde_json::Error> {
                let items = ordered("config item", &mut transformer.items, &transformer.items_order)?;
                Ok((
                    key,
                    Transformer {
                        label: transformer.label,
                        order: transformer.order,
                        items,
                    },
                ))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(Self {
            filter_functions,
            matching_methods,
            transformers,
        })
    }

    pub fn matching_method(&self, name: &str) -> Option<&MatchingMethod> {
        self.matching_methods
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, method)| method)
    }

    pub fn transformer(&self, name: &str) -> Option<&Transformer> {
        self.transformers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, transformer)| transformer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn follows_order_arrays() {
        let methods = Methods::from_value(json!({
            "filter_functions": {
                "equals": {"label": "Equals", "type": "string", "order": 1},
                "empty": {"label": "Empty", "order": 0}
            },
            "filter_functions_order": ["empty", "equals"],
            "matching_methods": {
                "jaro": {
                    "label": "Jaro",
                    "description": "",
                    "type": "similarity",
                    "order": 1,
                    "items": {
                        "threshold": {"label": "Threshold", "type": "range", "default_value": 0.7},
                        "case": {"label": "Case sensitive", "type": "boolean"}
                    },
                    "items_order": ["threshold", "case"]
                }
            },
            "matching_methods_order": ["jaro"],
            "transformers": {
                "lowercase": {"label": "Lowercase", "order": 0, "items": {}, "items_order": []}
            },
            "transformers_order": ["lowercase"]
        }))
        .unwrap();

        let names: Vec<_> = methods.filter_functions.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["empty", "equals"]);

        let jaro = methods.matching_method("jaro").unwrap();
        assert_eq!(jaro.kind, "similarity");
        assert_eq!(jaro.items[0].0, "threshold");
        assert_eq!(jaro.items[0].1.extra["default_value"], 0.7);
        assert!(methods.transformer("lowercase").is_some());
    }

    #[test]
    fn missing_entry_is_an_error() {
        let result = Methods::from_value(json!({
            "filter_functions": {},
            "filter_functions_order": ["ghost"],
            "matching_methods": {},
            "matching_methods_order": [],
            "transformers": {},
            "transformers_order": []
        }));
        assert!(result.is_err());
    }
}
