//! Relevance weighting applied to the backend's native query before execution.
//!
//! The rewrites run in a fixed order because later ones read what earlier ones wrote:
//! field boosts, listing sort and fuzziness fixes, the function-score envelope,
//! attachment highlighting, unmapped-sort hints and finally the local index boost.

use crate::cohort::OperatingMode;
use crate::config::Settings;
use crate::query::dsl::{
    DecayKind, DecayParams, FormattedQuery, Highlight, IndexBoost, ScoreFunction, SortEntry,
    SourceFilter,
};
use crate::query::{ATTACHMENT_CONTENT_FIELD, EVENT_DATE_FIELD, SearchRequest};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};

/// Title boost marker in query-string field syntax.
pub const BOOSTED_TITLE: &str = "post_title^3";

/// Weight on post types for site searches. Matched by exact `post_type.raw` term.
pub const POST_TYPE_BOOSTS: &[(&str, f64)] = &[
    ("agency", 2.0),
    ("question", 1.9),
    ("payment", 1.9),
    ("issue", 1.9),
    ("page", 1.3),
    ("event", 1.2),
    ("proud_location", 1.1),
];

/// Boost on hits from this node's own index.
pub const LOCAL_INDEX_BOOST: f64 = 1.1;

const ATTACHMENT_DEBOOST: f64 = 0.75;

/// Source fields holding raw or extracted attachment data.
const EXCLUDED_SOURCE: &[&str] = &["attachments*data", "attachments*content"];

#[derive(Debug, Clone, Copy)]
pub struct WeightingEngine<'a> {
    settings: &'a Settings,
}

impl<'a> WeightingEngine<'a> {
    pub const fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Rewrite `query` for the request described by `args`.
    ///
    /// Agent nodes return the query unchanged.
    pub fn weight(&self, mut query: FormattedQuery, args: &SearchRequest) -> FormattedQuery {
        if self.settings.mode == OperatingMode::Agent {
            return query;
        }

        let attachments = self.settings.attachments_active();

        if args.search_term().is_some() {
            boost_title(&mut query, attachments);

            if attachments && !args.is_search() {
                prefer_relevance(&mut query);
                drop_secondary_fuzziness(&mut query);
            }

            if !self.settings.decay_by_date {
                apply_function_score(&mut query, args.is_search());
            }
        }

        if attachments {
            highlight_attachments(&mut query);
        }

        hint_unmapped_sorts(&mut query.sort);

        if !self.settings.local_tenant_id.is_empty() {
            query.indices_boost = vec![IndexBoost {
                index: self.settings.local_tenant_id.clone(),
                boost: LOCAL_INDEX_BOOST,
            }];
        }

        query
    }
}

fn boost_title(query: &mut FormattedQuery, attachments: bool) {
    let Some(clause) = query.should_multi_match_mut(0) else {
        return;
    };
    let Some(first) = clause.fields.first_mut() else {
        return;
    };
    if !first.contains("post_title") {
        return;
    }
    *first = BOOSTED_TITLE.to_string();

    if attachments {
        for field in &mut clause.fields {
            if field == ATTACHMENT_CONTENT_FIELD {
                *field = format!("{}^{}", ATTACHMENT_CONTENT_FIELD, ATTACHMENT_DEBOOST);
            }
        }
    }
}

/// Put relevance first on content listings, keeping the configured sort as a tiebreak.
fn prefer_relevance(query: &mut FormattedQuery) {
    match query.sort.first() {
        None => query.sort.push(SortEntry::score()),
        Some(first) if first.is_score() => {}
        Some(first) => {
            let displaced = first.clone();
            query.sort.push(displaced);
            query.sort[0] = SortEntry::score();
        }
    }
}

/// Extracted document text matches badly when fuzzy.
fn drop_secondary_fuzziness(query: &mut FormattedQuery) {
    if let Some(clause) = query.should_multi_match_mut(1)
        && clause.is_fuzzy()
    {
        clause.fuzziness = Some(json!(0));
    }
}

fn apply_function_score(query: &mut FormattedQuery, is_search: bool) {
    let mut functions = vec![ScoreFunction::decay(
        DecayKind::Linear,
        "menu_order",
        DecayParams {
            origin: Some(json!(0)),
            scale: Some(json!(1000)),
            offset: None,
            decay: Some(0.8),
        },
    )];

    if is_search {
        if !query.sort.is_empty() {
            query.sort = vec![SortEntry::score()];
        }

        functions.extend(
            POST_TYPE_BOOSTS
                .iter()
                .map(|(post_type, weight)| ScoreFunction::term_weight("post_type.raw", post_type, *weight)),
        );

        functions.push(ScoreFunction::decay(
            DecayKind::Gauss,
            format!("meta.{}.date", EVENT_DATE_FIELD),
            DecayParams {
                origin: None,
                scale: Some(json!("10d")),
                offset: Some(json!("5d")),
                decay: Some(0.5),
            },
        ));
    }

    query.wrap_in_function_score(functions);
}

fn highlight_attachments(query: &mut FormattedQuery) {
    let mut plain = Map::new();
    plain.insert("type".to_string(), Value::String("plain".to_string()));

    query.highlight = Some(Highlight {
        fields: IndexMap::from([
            (ATTACHMENT_CONTENT_FIELD.to_string(), Map::new()),
            ("post_content".to_string(), plain),
        ]),
        extra: Map::new(),
    });
    query.source = Some(SourceFilter::Fields {
        includes: Vec::new(),
        excludes: EXCLUDED_SOURCE.iter().map(|s| (*s).to_string()).collect(),
    });
}

/// `meta.<field>.<type>` sorts name the type to assume where the field is missing.
fn hint_unmapped_sorts(sort: &mut [SortEntry]) {
    for entry in sort {
        let kind = entry
            .field
            .split('.')
            .nth(2)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
        if let Some(kind) = kind {
            entry.set_unmapped_type(&kind);
        }
    }
}
