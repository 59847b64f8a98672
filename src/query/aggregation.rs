//! Aggregation requests attached at routing time and the bucket counts they produce.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Aggregation over post types, attached to site search widgets.
pub const SEARCH_AGGREGATION: &str = "search_aggregation";
/// Aggregation over category names, attached to filtered listings.
pub const TERMS_AGGREGATION: &str = "terms_aggregation";

pub const POST_TYPE_BUCKETS: &str = "post_type";
pub const CATEGORY_BUCKETS: &str = "categories";

/// Bucket count for category aggregations.
pub const CATEGORY_BUCKET_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsAggregation {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAggregation {
    pub terms: TermsAggregation,
}

/// Named aggregation block; `use-filter` applies the query's other filters to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub name: String,
    #[serde(rename = "use-filter", default)]
    pub use_filter: bool,
    pub aggs: IndexMap<String, SubAggregation>,
}

impl AggregationRequest {
    /// Post type counts for a search widget.
    pub fn post_types() -> Self {
        Self {
            name: SEARCH_AGGREGATION.to_string(),
            use_filter: true,
            aggs: IndexMap::from([(
                POST_TYPE_BUCKETS.to_string(),
                SubAggregation {
                    terms: TermsAggregation {
                        field: "post_type.raw".to_string(),
                        size: None,
                    },
                },
            )]),
        }
    }

    /// Category name counts for a listing filtered by `taxonomy`.
    pub fn categories(taxonomy: &str) -> Self {
        Self {
            name: TERMS_AGGREGATION.to_string(),
            use_filter: true,
            aggs: IndexMap::from([(
                CATEGORY_BUCKETS.to_string(),
                SubAggregation {
                    terms: TermsAggregation {
                        field: format!("terms.{}.name.raw", taxonomy),
                        size: Some(CATEGORY_BUCKET_SIZE),
                    },
                },
            )]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
}

/// Bucket lists from one query execution, keyed by aggregation then sub-aggregation name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationResults {
    groups: IndexMap<String, IndexMap<String, Vec<Bucket>>>,
}

impl AggregationResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the `aggregations` object of a search response.
    ///
    /// Anything that does not look like a bucket list is ignored.
    pub fn from_response(aggregations: &Value) -> Self {
        let mut results = Self::new();
        let Some(groups) = aggregations.as_object() else {
            return results;
        };

        for (name, group) in groups {
            let Some(group) = group.as_object() else {
                continue;
            };
            for (sub, body) in group {
                let Some(buckets) = body.get("buckets").and_then(Value::as_array) else {
                    continue;
                };
                let parsed = buckets.iter().filter_map(parse_bucket).collect();
                results.insert(name, sub, parsed);
            }
        }

        results
    }

    pub fn insert(&mut self, aggregation: &str, sub: &str, buckets: Vec<Bucket>) {
        self.groups
            .entry(aggregation.to_string())
            .or_default()
            .insert(sub.to_string(), buckets);
    }

    /// Buckets for `aggregation.sub`, `None` when absent or empty.
    pub fn buckets(&self, aggregation: &str, sub: &str) -> Option<&[Bucket]> {
        self.groups
            .get(aggregation)
            .and_then(|group| group.get(sub))
            .map(Vec::as_slice)
            .filter(|buckets| !buckets.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn parse_bucket(value: &Value) -> Option<Bucket> {
    let key = match value.get("key")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let doc_count = value.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
    Some(Bucket { key, doc_count })
}
