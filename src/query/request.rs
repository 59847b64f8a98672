//! Listing/search arguments as handed over by the page and widget layer.
//!
//! Field names follow the keys the query layer exchanges with the backend integration
//! (`s`, `site__in`, `proud_teaser_search`, ...). Keys this crate does not read are kept
//! in `extra` and passed through.

use crate::query::AggregationRequest;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Which indices a query should cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScopeRepr", into = "ScopeRepr")]
pub enum SiteScope {
    /// This node's own index
    Current,
    /// Every index in the cohort, as far as the operating mode allows
    All,
    Tenant(String),
    Tenants(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ScopeRepr {
    One(String),
    Many(Vec<String>),
}

impl From<ScopeRepr> for SiteScope {
    fn from(repr: ScopeRepr) -> Self {
        match repr {
            ScopeRepr::One(s) if s == "current" => Self::Current,
            ScopeRepr::One(s) if s == "all" => Self::All,
            ScopeRepr::One(s) => Self::Tenant(s),
            ScopeRepr::Many(ids) => Self::Tenants(ids),
        }
    }
}

impl From<SiteScope> for ScopeRepr {
    fn from(scope: SiteScope) -> Self {
        match scope {
            SiteScope::Current => Self::One("current".to_string()),
            SiteScope::All => Self::One("all".to_string()),
            SiteScope::Tenant(id) => Self::One(id),
            SiteScope::Tenants(ids) => Self::Many(ids),
        }
    }
}

/// `post_type` may name one type or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostTypes {
    One(String),
    Many(Vec<String>),
}

impl PostTypes {
    /// The type used to pick a taxonomy: the only one, or the first listed.
    pub fn primary(&self) -> Option<&str> {
        match self {
            Self::One(t) => Some(t.as_str()),
            Self::Many(types) => types.first().map(String::as_str),
        }
    }
}

/// A taxonomy term reference: numeric id or stored name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermRef {
    Id(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxClause {
    pub taxonomy: String,
    /// `term_id`, `name` or `slug`
    pub field: String,
    #[serde(default)]
    pub terms: Vec<TermRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl TaxClause {
    /// Exact-match (OR) clause on `field`.
    pub fn any_of(taxonomy: &str, field: &str, terms: Vec<TermRef>) -> Self {
        Self {
            taxonomy: taxonomy.to_string(),
            field: field.to_string(),
            terms,
            operator: Some("IN".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text term
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,

    #[serde(rename = "proud_search_ajax", default, deserialize_with = "truthy", skip_serializing_if = "is_false")]
    pub ajax_search: bool,

    /// Site-search widget
    #[serde(rename = "proud_teaser_search", default, deserialize_with = "truthy", skip_serializing_if = "is_false")]
    pub teaser_search: bool,

    /// Content listing widget
    #[serde(rename = "proud_teaser_query", default, deserialize_with = "truthy", skip_serializing_if = "is_false")]
    pub teaser_query: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_type: Option<PostTypes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_query: Vec<TaxClause>,

    #[serde(rename = "site__in", default, skip_serializing_if = "Option::is_none")]
    pub site_scope: Option<SiteScope>,

    /// Explicit index list, overrides `site_scope`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_index: Option<String>,

    /// Federation flag: the backend handles this query
    #[serde(rename = "proud_ep_integrate", default, deserialize_with = "truthy", skip_serializing_if = "is_false")]
    pub integrate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggs: Option<AggregationRequest>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchRequest {
    /// The free-text term, when it is non-empty.
    pub fn search_term(&self) -> Option<&str> {
        self.term.as_deref().filter(|t| !t.is_empty())
    }

    /// Either search surface (site search widget or ajax search box).
    pub const fn is_search(&self) -> bool {
        self.teaser_search || self.ajax_search
    }
}

/// Settings of the widget that issued the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormContext {
    /// Widget type (post type being listed, or `search`)
    #[serde(rename = "type")]
    pub widget_type: Option<String>,
    pub taxonomy: Option<String>,
    pub form_id_base: Option<String>,
    pub form_instance: FormInstance,
    pub options: WidgetOptions,
}

/// Values the visitor picked in the widget's filter form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormInstance {
    pub filter_index: Option<String>,
    pub filter_categories: Vec<String>,
}

/// Editor-configured widget options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetOptions {
    /// Content source: a tenant id or `all`
    pub elastic_index: Option<String>,
    /// Free-text comma list of category ids on the source site
    pub external_categories: Option<String>,
}

impl FormContext {
    pub fn widget_type(&self) -> Option<&str> {
        non_empty(self.widget_type.as_deref())
    }

    pub fn taxonomy(&self) -> Option<&str> {
        non_empty(self.taxonomy.as_deref())
    }

    pub fn form_id(&self) -> Option<&str> {
        non_empty(self.form_id_base.as_deref())
    }

    pub fn content_source(&self) -> Option<&str> {
        non_empty(self.options.elastic_index.as_deref())
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Loose truthiness for flags set by templates: `true`, `1`, `"1"`, `"yes"` all count.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(&value))
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if passes by reference
const fn is_false(flag: &bool) -> bool {
    !*flag
}
