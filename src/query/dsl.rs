//! Typed model of the backend's search request body.
//!
//! Only the shapes the weighting pass rewrites get their own types: boolean clauses,
//! multi-match clauses, function-score envelopes, term filters, sort entries, highlight
//! and `_source` settings and per-index boosts. Everything else is carried as raw JSON
//! (`Query::Other`, `extra` maps) and written back unchanged, so a body can be read,
//! rewritten and serialized without losing anything the pipeline does not know about.

use crate::error::{DslError, json_kind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

type Object = Map<String, Value>;

/// Sort key for relevance.
pub const SCORE_FIELD: &str = "_score";

/// A search request body as produced by the backend's query builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct FormattedQuery {
    pub query: Option<Query>,
    pub sort: Vec<SortEntry>,
    pub highlight: Option<Highlight>,
    pub source: Option<SourceFilter>,
    pub indices_boost: Vec<IndexBoost>,
    /// Keys this model does not interpret (`from`, `size`, `post_filter`, `aggs`, ...)
    pub extra: Object,
}

/// Query clause tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Bool(BoolQuery),
    MultiMatch(MultiMatch),
    FunctionScore(Box<FunctionScore>),
    Term(TermQuery),
    /// Any clause kind the pipeline never rewrites, kept verbatim
    Other(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub filter: Vec<Query>,
    pub must_not: Vec<Query>,
    /// `minimum_should_match`, `boost`, ...
    pub extra: Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiMatch {
    /// Field list in query-string syntax; `name^2` boosts a field
    pub fields: Vec<String>,
    pub fuzziness: Option<Value>,
    /// `query`, `type`, `operator`, `boost`, ...
    pub extra: Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionScore {
    pub query: Query,
    pub functions: Vec<ScoreFunction>,
    /// `score_mode`, `boost_mode`, ...
    pub extra: Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayKind {
    Linear,
    Gauss,
    Exp,
}

impl DecayKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Gauss => "gauss",
            Self::Exp => "exp",
        }
    }

    fn parse(key: &str) -> Option<Self> {
        match key {
            "linear" => Some(Self::Linear),
            "gauss" => Some(Self::Gauss),
            "exp" => Some(Self::Exp),
            _ => None,
        }
    }
}

/// Parameters of a decay function. Origin, scale and offset may be numbers or
/// date-math strings (`"10d"`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecayParams {
    pub origin: Option<Value>,
    pub scale: Option<Value>,
    pub offset: Option<Value>,
    pub decay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreFunction {
    Decay {
        kind: DecayKind,
        field: String,
        params: DecayParams,
    },
    Weight {
        filter: Option<Query>,
        weight: f64,
    },
    Other(Value),
}

/// One sort clause: `{"field": {"order": "desc", ...}}` or a bare `"field"`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortEntry {
    pub field: String,
    pub options: Object,
    bare: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Highlight {
    /// Field name -> per-field options (`{"type": "plain"}`, or empty)
    pub fields: IndexMap<String, Object>,
    pub extra: Object,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceFilter {
    Fields {
        includes: Vec<String>,
        excludes: Vec<String>,
    },
    /// `true`, `false` or a plain field list
    Other(Value),
}

/// Score multiplier for every hit coming from one index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBoost {
    pub index: String,
    pub boost: f64,
}

// --- Construction helpers ---

impl SortEntry {
    pub fn new(field: impl Into<String>, order: &str) -> Self {
        let mut options = Object::new();
        options.insert("order".to_string(), Value::String(order.to_string()));
        Self {
            field: field.into(),
            options,
            bare: false,
        }
    }

    /// `{"_score": {"order": "desc"}}`
    pub fn score() -> Self {
        Self::new(SCORE_FIELD, "desc")
    }

    pub fn is_score(&self) -> bool {
        self.field == SCORE_FIELD
    }

    /// Tell the backend which type to assume for documents missing the field.
    pub fn set_unmapped_type(&mut self, kind: &str) {
        self.bare = false;
        self.options
            .insert("unmapped_type".to_string(), Value::String(kind.to_string()));
    }

    pub fn unmapped_type(&self) -> Option<&str> {
        self.options.get("unmapped_type").and_then(Value::as_str)
    }
}

impl ScoreFunction {
    pub fn decay(kind: DecayKind, field: impl Into<String>, params: DecayParams) -> Self {
        Self::Decay {
            kind,
            field: field.into(),
            params,
        }
    }

    /// Fixed weight for documents whose `field` equals `value` exactly.
    pub fn term_weight(field: &str, value: &str, weight: f64) -> Self {
        Self::Weight {
            filter: Some(Query::Term(TermQuery {
                field: field.to_string(),
                value: Value::String(value.to_string()),
            })),
            weight,
        }
    }
}

impl Query {
    pub fn match_all() -> Self {
        Self::Other(json!({ "match_all": {} }))
    }

    pub const fn as_bool(&self) -> Option<&BoolQuery> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub const fn as_bool_mut(&mut self) -> Option<&mut BoolQuery> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub const fn as_multi_match(&self) -> Option<&MultiMatch> {
        match self {
            Self::MultiMatch(m) => Some(m),
            _ => None,
        }
    }

    pub const fn as_multi_match_mut(&mut self) -> Option<&mut MultiMatch> {
        match self {
            Self::MultiMatch(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_function_score(&self) -> Option<&FunctionScore> {
        match self {
            Self::FunctionScore(f) => Some(&**f),
            _ => None,
        }
    }
}

impl FormattedQuery {
    pub fn new(query: Query) -> Self {
        Self {
            query: Some(query),
            sort: Vec::new(),
            highlight: None,
            source: None,
            indices_boost: Vec::new(),
            extra: Object::new(),
        }
    }

    /// The multi-match clause at `bool.should[index]`, if the body has that shape.
    pub fn should_multi_match(&self, index: usize) -> Option<&MultiMatch> {
        self.query
            .as_ref()?
            .as_bool()?
            .should
            .get(index)?
            .as_multi_match()
    }

    pub fn should_multi_match_mut(&mut self, index: usize) -> Option<&mut MultiMatch> {
        self.query
            .as_mut()?
            .as_bool_mut()?
            .should
            .get_mut(index)?
            .as_multi_match_mut()
    }

    /// Replace the query with a function-score envelope around it.
    pub fn wrap_in_function_score(&mut self, functions: Vec<ScoreFunction>) {
        let inner = self.query.take().unwrap_or_else(Query::match_all);
        self.query = Some(Query::FunctionScore(Box::new(FunctionScore {
            query: inner,
            functions,
            extra: Object::new(),
        })));
    }

    pub fn function_score(&self) -> Option<&FunctionScore> {
        self.query.as_ref()?.as_function_score()
    }
}

// --- JSON -> model ---

impl TryFrom<Value> for FormattedQuery {
    type Error = DslError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut body) = value else {
            return Err(DslError::NotAnObject {
                path: "$".to_string(),
                found: json_kind(&value),
            });
        };

        let query = match body.remove("query") {
            None | Some(Value::Null) => None,
            Some(q @ Value::Object(_)) => Some(Query::from_value(q)),
            Some(other) => {
                return Err(DslError::Malformed {
                    path: "$.query".to_string(),
                    reason: format!("expected an object, found {}", json_kind(&other)),
                });
            }
        };

        let sort = match body.remove("sort") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| SortEntry::from_value(entry, i))
                .collect::<Result<_, _>>()?,
            Some(single) => vec![SortEntry::from_value(single, 0)?],
        };

        let highlight = match body.remove("highlight") {
            None | Some(Value::Null) => None,
            Some(Value::Object(h)) => Some(Highlight::from_object(h)),
            Some(other) => {
                return Err(DslError::Malformed {
                    path: "$.highlight".to_string(),
                    reason: format!("expected an object, found {}", json_kind(&other)),
                });
            }
        };

        let source = body.remove("_source").map(SourceFilter::from_value);

        let indices_boost = match body.remove("indices_boost") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => IndexBoost::list_from_value(value)?,
        };

        Ok(Self {
            query,
            sort,
            highlight,
            source,
            indices_boost,
            extra: body,
        })
    }
}

impl Query {
    /// Read a clause. Shapes without a typed model stay `Other`.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(ref clause) = value else {
            return Self::Other(value);
        };
        if clause.len() != 1 {
            return Self::Other(value);
        }
        let Some((kind, body)) = clause.iter().next() else {
            return Self::Other(value);
        };

        let parsed = match (kind.as_str(), body) {
            ("bool", Value::Object(b)) => Some(Self::Bool(BoolQuery::from_object(b.clone()))),
            ("multi_match", Value::Object(m)) => {
                MultiMatch::from_object(m.clone()).map(Self::MultiMatch)
            }
            ("function_score", Value::Object(f)) => FunctionScore::from_object(f.clone())
                .map(|f| Self::FunctionScore(Box::new(f))),
            ("term", Value::Object(t)) if t.len() == 1 => {
                t.iter().next().map(|(field, value)| {
                    Self::Term(TermQuery {
                        field: field.clone(),
                        value: value.clone(),
                    })
                })
            }
            _ => None,
        };

        parsed.unwrap_or(Self::Other(value))
    }
}

fn clause_list(value: Value) -> Vec<Query> {
    match value {
        Value::Array(items) => items.into_iter().map(Query::from_value).collect(),
        Value::Null => Vec::new(),
        single => vec![Query::from_value(single)],
    }
}

impl BoolQuery {
    fn from_object(mut body: Object) -> Self {
        let mut take = |key: &str| body.remove(key).map(clause_list).unwrap_or_default();
        let must = take("must");
        let should = take("should");
        let filter = take("filter");
        let must_not = take("must_not");
        Self {
            must,
            should,
            filter,
            must_not,
            extra: body,
        }
    }
}

impl MultiMatch {
    fn from_object(mut body: Object) -> Option<Self> {
        let fields = match body.remove("fields") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|f| match f {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()?,
            Some(_) => return None,
        };
        let fuzziness = body.remove("fuzziness");
        Some(Self {
            fields,
            fuzziness,
            extra: body,
        })
    }

    /// Whether fuzzy matching is requested (`0`, `"0"`, `false` and empty mean no).
    pub fn is_fuzzy(&self) -> bool {
        match &self.fuzziness {
            None | Some(Value::Null) => false,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty() && s != "0",
            Some(Value::Bool(b)) => *b,
            Some(_) => true,
        }
    }
}

impl FunctionScore {
    fn from_object(mut body: Object) -> Option<Self> {
        let query = match body.remove("query") {
            Some(q) => Query::from_value(q),
            None => Query::match_all(),
        };
        let functions = match body.remove("functions") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.into_iter().map(ScoreFunction::from_value).collect(),
            Some(_) => return None,
        };
        Some(Self {
            query,
            functions,
            extra: body,
        })
    }
}

impl ScoreFunction {
    fn from_value(value: Value) -> Self {
        let Value::Object(ref body) = value else {
            return Self::Other(value);
        };

        // {"linear": {"field": {...params}}}
        if body.len() == 1
            && let Some((key, Value::Object(inner))) = body.iter().next()
            && let Some(kind) = DecayKind::parse(key)
            && inner.len() == 1
            && let Some((field, Value::Object(params))) = inner.iter().next()
        {
            let known = ["origin", "scale", "offset", "decay"];
            if params.keys().all(|k| known.contains(&k.as_str())) {
                return Self::Decay {
                    kind,
                    field: field.clone(),
                    params: DecayParams {
                        origin: params.get("origin").cloned(),
                        scale: params.get("scale").cloned(),
                        offset: params.get("offset").cloned(),
                        decay: params.get("decay").and_then(Value::as_f64),
                    },
                };
            }
        }

        // {"filter": {...}, "weight": n}
        let weight_only = body
            .keys()
            .all(|k| k == "filter" || k == "weight");
        if weight_only && let Some(weight) = body.get("weight").and_then(Value::as_f64) {
            return Self::Weight {
                filter: body.get("filter").cloned().map(Query::from_value),
                weight,
            };
        }

        Self::Other(value)
    }
}

impl SortEntry {
    fn from_value(value: Value, index: usize) -> Result<Self, DslError> {
        match value {
            Value::String(field) => Ok(Self {
                field,
                options: Object::new(),
                bare: true,
            }),
            Value::Object(entry) if entry.len() == 1 => {
                let Some((field, spec)) = entry.into_iter().next() else {
                    return Err(DslError::Malformed {
                        path: format!("$.sort[{}]", index),
                        reason: "empty sort entry".to_string(),
                    });
                };
                let options = match spec {
                    Value::Object(options) => options,
                    Value::String(order) => {
                        let mut options = Object::new();
                        options.insert("order".to_string(), Value::String(order));
                        options
                    }
                    other => {
                        return Err(DslError::Malformed {
                            path: format!("$.sort[{}].{}", index, field),
                            reason: format!("unexpected {}", json_kind(&other)),
                        });
                    }
                };
                Ok(Self {
                    field,
                    options,
                    bare: false,
                })
            }
            other => Err(DslError::Malformed {
                path: format!("$.sort[{}]", index),
                reason: format!("expected a field name or single-key object, found {}", json_kind(&other)),
            }),
        }
    }
}

impl Highlight {
    fn from_object(mut body: Object) -> Self {
        let fields = match body.remove("fields") {
            Some(Value::Object(fields)) => fields
                .into_iter()
                .map(|(name, options)| match options {
                    Value::Object(o) => (name, o),
                    _ => (name, Object::new()),
                })
                .collect(),
            _ => IndexMap::new(),
        };
        Self {
            fields,
            extra: body,
        }
    }
}

impl SourceFilter {
    fn from_value(value: Value) -> Self {
        let Value::Object(ref filter) = value else {
            return Self::Other(value);
        };
        if !filter.keys().all(|k| k == "includes" || k == "excludes") {
            return Self::Other(value);
        }

        let strings = |key: &str| -> Option<Vec<String>> {
            match filter.get(key) {
                None => Some(Vec::new()),
                Some(Value::String(s)) => Some(vec![s.clone()]),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect(),
                Some(_) => None,
            }
        };

        match (strings("includes"), strings("excludes")) {
            (Some(includes), Some(excludes)) => Self::Fields { includes, excludes },
            _ => Self::Other(value),
        }
    }
}

impl IndexBoost {
    fn list_from_value(value: Value) -> Result<Vec<Self>, DslError> {
        let malformed = |reason: String| DslError::Malformed {
            path: "$.indices_boost".to_string(),
            reason,
        };

        let entries = match value {
            Value::Array(entries) => entries,
            // Legacy object form: {"index": boost, ...}
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| Value::Object(Object::from_iter([(k, v)])))
                .collect(),
            other => return Err(malformed(format!("unexpected {}", json_kind(&other)))),
        };

        let mut boosts = Vec::new();
        for entry in entries {
            let Value::Object(map) = entry else {
                return Err(malformed("entries must be objects".to_string()));
            };
            for (index, boost) in map {
                let boost = boost
                    .as_f64()
                    .ok_or_else(|| malformed(format!("boost for '{}' is not a number", index)))?;
                boosts.push(Self { index, boost });
            }
        }
        Ok(boosts)
    }
}

// --- model -> JSON ---

impl From<FormattedQuery> for Value {
    fn from(formatted: FormattedQuery) -> Self {
        let mut body = Object::new();

        if let Some(query) = formatted.query {
            body.insert("query".to_string(), query.into());
        }
        if !formatted.sort.is_empty() {
            body.insert(
                "sort".to_string(),
                Self::Array(formatted.sort.into_iter().map(Into::into).collect()),
            );
        }
        if let Some(highlight) = formatted.highlight {
            body.insert("highlight".to_string(), highlight.into());
        }
        if let Some(source) = formatted.source {
            body.insert("_source".to_string(), source.into());
        }
        if !formatted.indices_boost.is_empty() {
            body.insert(
                "indices_boost".to_string(),
                Self::Array(formatted.indices_boost.into_iter().map(Into::into).collect()),
            );
        }

        body.extend(formatted.extra);
        Self::Object(body)
    }
}

impl From<Query> for Value {
    fn from(query: Query) -> Self {
        match query {
            Query::Bool(b) => {
                let mut body = Object::new();
                for (key, clauses) in [
                    ("must", b.must),
                    ("should", b.should),
                    ("filter", b.filter),
                    ("must_not", b.must_not),
                ] {
                    if !clauses.is_empty() {
                        body.insert(
                            key.to_string(),
                            Self::Array(clauses.into_iter().map(Into::into).collect()),
                        );
                    }
                }
                body.extend(b.extra);
                json!({ "bool": body })
            }
            Query::MultiMatch(m) => {
                let mut body = Object::new();
                body.extend(m.extra);
                body.insert(
                    "fields".to_string(),
                    Self::Array(m.fields.into_iter().map(Self::String).collect()),
                );
                if let Some(fuzziness) = m.fuzziness {
                    body.insert("fuzziness".to_string(), fuzziness);
                }
                json!({ "multi_match": body })
            }
            Query::FunctionScore(f) => {
                let FunctionScore {
                    query,
                    functions,
                    extra,
                } = *f;
                let mut body = Object::new();
                body.insert("query".to_string(), query.into());
                body.insert(
                    "functions".to_string(),
                    Self::Array(functions.into_iter().map(Into::into).collect()),
                );
                body.extend(extra);
                json!({ "function_score": body })
            }
            Query::Term(t) => json!({ "term": { t.field: t.value } }),
            Query::Other(value) => value,
        }
    }
}

impl From<ScoreFunction> for Value {
    fn from(function: ScoreFunction) -> Self {
        match function {
            ScoreFunction::Decay {
                kind,
                field,
                params,
            } => {
                let mut body = Object::new();
                if let Some(origin) = params.origin {
                    body.insert("origin".to_string(), origin);
                }
                if let Some(scale) = params.scale {
                    body.insert("scale".to_string(), scale);
                }
                if let Some(offset) = params.offset {
                    body.insert("offset".to_string(), offset);
                }
                if let Some(decay) = params.decay {
                    body.insert("decay".to_string(), json!(decay));
                }
                json!({ kind.as_str(): { field: body } })
            }
            ScoreFunction::Weight { filter, weight } => {
                let mut body = Object::new();
                if let Some(filter) = filter {
                    body.insert("filter".to_string(), filter.into());
                }
                body.insert("weight".to_string(), json!(weight));
                Self::Object(body)
            }
            ScoreFunction::Other(value) => value,
        }
    }
}

impl From<SortEntry> for Value {
    fn from(entry: SortEntry) -> Self {
        if entry.bare && entry.options.is_empty() {
            Self::String(entry.field)
        } else {
            json!({ entry.field: entry.options })
        }
    }
}

impl From<Highlight> for Value {
    fn from(highlight: Highlight) -> Self {
        let fields: Object = highlight
            .fields
            .into_iter()
            .map(|(name, options)| (name, Self::Object(options)))
            .collect();
        let mut body = Object::new();
        body.insert("fields".to_string(), Self::Object(fields));
        body.extend(highlight.extra);
        Self::Object(body)
    }
}

impl From<SourceFilter> for Value {
    fn from(source: SourceFilter) -> Self {
        match source {
            SourceFilter::Fields { includes, excludes } => {
                let mut body = Object::new();
                if !includes.is_empty() {
                    body.insert("includes".to_string(), json!(includes));
                }
                body.insert("excludes".to_string(), json!(excludes));
                Self::Object(body)
            }
            SourceFilter::Other(value) => value,
        }
    }
}

impl From<IndexBoost> for Value {
    fn from(boost: IndexBoost) -> Self {
        json!({ boost.index: boost.boost })
    }
}
