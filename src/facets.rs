//! Filter form fields: aggregation counts merged into options, plus the cohort-aware
//! fields added to search forms and listing widget settings.

use crate::cohort::{ALL_SITES, CohortRegistry, OperatingMode};
use crate::config::Settings;
use crate::context::RequestContext;
use crate::html::decode_term;
use crate::query::aggregation::{CATEGORY_BUCKETS, POST_TYPE_BUCKETS, SEARCH_AGGREGATION, TERMS_AGGREGATION};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const CATEGORY_FIELD: &str = "filter_categories";
pub const POST_TYPE_FIELD: &str = "filter_post_type";
pub const SITE_FIELD: &str = "filter_index";
pub const CONTENT_SOURCE_FIELD: &str = "elastic_index";
pub const EXTERNAL_CATEGORIES_FIELD: &str = "external_categories";

/// One form field as handed to the form renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDefinition {
    pub title: String,
    /// Widget kind: `radios`, `checkboxes`, `text`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Value -> label
    pub options: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDefinition {
    fn radios(title: &str, options: IndexMap<String, String>, default_value: &str) -> Self {
        Self {
            title: title.to_string(),
            kind: "radios".to_string(),
            options,
            default_value: Some(default_value.to_string()),
            description: None,
        }
    }
}

/// Rewrite category and post type options of a registered form with bucket counts.
pub fn merge(fields: &mut IndexMap<String, FieldDefinition>, form_id: &str, ctx: &RequestContext) {
    if !ctx.is_registered(form_id) {
        return;
    }
    let aggregations = ctx.aggregations();

    if let Some(field) = fields.get_mut(CATEGORY_FIELD) {
        match aggregations.and_then(|a| a.buckets(TERMS_AGGREGATION, CATEGORY_BUCKETS)) {
            Some(buckets) => {
                field.options = buckets
                    .iter()
                    .map(|bucket| {
                        let name = decode_term(&bucket.key);
                        let label = format!("{} ({})", name, bucket.doc_count);
                        (name, label)
                    })
                    .collect();
            }
            // Terms are filtered by name, so options must be keyed by name too
            None => {
                field.options = field
                    .options
                    .values()
                    .map(|label| (label.clone(), label.clone()))
                    .collect();
            }
        }
    }

    if let Some(field) = fields.get_mut(POST_TYPE_FIELD)
        && let Some(buckets) = aggregations.and_then(|a| a.buckets(SEARCH_AGGREGATION, POST_TYPE_BUCKETS))
    {
        let mut options = IndexMap::new();
        if let Some(all) = field.options.get(ALL_SITES) {
            options.insert(ALL_SITES.to_string(), all.clone());
        }
        for bucket in buckets {
            match field.options.get(&bucket.key) {
                Some(label) => {
                    options.insert(bucket.key.clone(), format!("{} ({})", label, bucket.doc_count));
                }
                None => tracing::trace!("No '{}' option for post type bucket", bucket.key),
            }
        }
        field.options = options;
    }

    tracing::debug!("Merged facet counts into form '{}'", form_id);
}

/// Per-request "search site" radio, offered on search forms of full nodes.
pub fn site_filter(registry: &CohortRegistry<'_>, widget_type: &str) -> Option<FieldDefinition> {
    if registry.mode() != OperatingMode::Full || widget_type != "search" {
        return None;
    }
    Some(FieldDefinition::radios(
        "Search Site",
        registry.site_filter_options(),
        ALL_SITES,
    ))
}

/// Append the site filter to a search form's filters when it applies.
pub fn add_site_filter(
    filters: &mut IndexMap<String, FieldDefinition>,
    registry: &CohortRegistry<'_>,
    widget_type: &str,
) {
    if let Some(field) = site_filter(registry, widget_type) {
        filters.entry(SITE_FIELD.to_string()).or_insert(field);
    }
}

/// Content source settings for listing widgets of `post_type`.
///
/// Offered for types with attachment fields, posts and events.
pub fn widget_settings(settings: &Settings, post_type: &str) -> IndexMap<String, FieldDefinition> {
    let mut fields = IndexMap::new();
    let eligible = !settings.attachment_fields_for(post_type).is_empty()
        || post_type == "post"
        || post_type == "event";
    if !eligible {
        return fields;
    }

    fields.insert(
        EXTERNAL_CATEGORIES_FIELD.to_string(),
        FieldDefinition {
            title: "(Advanced) External category ids".to_string(),
            kind: "text".to_string(),
            default_value: Some(String::new()),
            description: Some(
                "Category ids from the source site's category admin (tag_ID in the url), separated by commas, e.g. 123,456,789".to_string(),
            ),
            ..FieldDefinition::default()
        },
    );

    let registry = settings.registry();
    let mut source = FieldDefinition::radios(
        "Content source",
        registry.content_source_options(),
        registry.local_id(),
    );
    source.description = Some("Where should this content be served from?".to_string());
    fields.insert(CONTENT_SOURCE_FIELD.to_string(), source);

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::Tenant;
    use crate::query::aggregation::{AggregationResults, Bucket};
    use assert2::check;

    fn options(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn form(field: &str, opts: IndexMap<String, String>) -> IndexMap<String, FieldDefinition> {
        IndexMap::from([(
            field.to_string(),
            FieldDefinition {
                title: "Filter".to_string(),
                kind: "checkboxes".to_string(),
                options: opts,
                ..FieldDefinition::default()
            },
        )])
    }

    #[test]
    fn unregistered_form_is_untouched() {
        let mut fields = form(CATEGORY_FIELD, options(&[("12", "Parks")]));
        let before = fields.clone();
        merge(&mut fields, "teaser_1", &RequestContext::new());
        check!(fields == before);
    }

    #[test]
    fn category_options_fall_back_to_name_keys() {
        let mut ctx = RequestContext::new();
        ctx.register_form("teaser_1");
        let mut fields = form(CATEGORY_FIELD, options(&[("12", "Parks"), ("13", "Budget")]));
        merge(&mut fields, "teaser_1", &ctx);
        check!(fields[CATEGORY_FIELD].options == options(&[("Parks", "Parks"), ("Budget", "Budget")]));
    }

    #[test]
    fn category_buckets_become_counted_options() {
        let mut ctx = RequestContext::new();
        ctx.register_form("teaser_1");
        let mut results = AggregationResults::new();
        results.insert(
            TERMS_AGGREGATION,
            CATEGORY_BUCKETS,
            vec![Bucket { key: "Parks &amp; Rec".into(), doc_count: 4 }],
        );
        ctx.record_aggregations(results);

        let mut fields = form(CATEGORY_FIELD, options(&[("12", "Parks & Rec")]));
        merge(&mut fields, "teaser_1", &ctx);
        check!(fields[CATEGORY_FIELD].options == options(&[("Parks & Rec", "Parks & Rec (4)")]));
    }

    #[test]
    fn post_type_buckets_never_invent_options() {
        let mut ctx = RequestContext::new();
        ctx.register_form("search_1");
        let mut results = AggregationResults::new();
        results.insert(
            SEARCH_AGGREGATION,
            POST_TYPE_BUCKETS,
            vec![
                Bucket { key: "event".into(), doc_count: 3 },
                Bucket { key: "secret_type".into(), doc_count: 9 },
                Bucket { key: "page".into(), doc_count: 5 },
            ],
        );
        ctx.record_aggregations(results);

        let mut fields = form(
            POST_TYPE_FIELD,
            options(&[("all", "All"), ("page", "Pages"), ("event", "Events"), ("document", "Documents")]),
        );
        merge(&mut fields, "search_1", &ctx);
        check!(
            fields[POST_TYPE_FIELD].options
                == options(&[("all", "All"), ("event", "Events (3)"), ("page", "Pages (5)")])
        );
    }

    #[test]
    fn post_types_without_buckets_are_kept() {
        let mut ctx = RequestContext::new();
        ctx.register_form("search_1");
        let opts = options(&[("all", "All"), ("page", "Pages")]);
        let mut fields = form(POST_TYPE_FIELD, opts.clone());
        merge(&mut fields, "search_1", &ctx);
        check!(fields[POST_TYPE_FIELD].options == opts);
    }

    fn full_settings() -> Settings {
        Settings {
            mode: OperatingMode::Full,
            local_tenant_id: "maintenant".to_string(),
            cohort: IndexMap::from([(
                "othertenant".to_string(),
                Tenant {
                    name: "Parks".to_string(),
                    url: "https://parks.example.org".to_string(),
                    color: "#2e7d32".to_string(),
                },
            )]),
            ..Settings::default()
        }
    }

    #[test]
    fn site_filter_only_for_full_search_forms() {
        let settings = full_settings();
        let registry = settings.registry();
        let field = site_filter(&registry, "search").unwrap();
        check!(field.options == options(&[("all", "All Sites"), ("othertenant", "Parks")]));
        check!(field.default_value.as_deref() == Some("all"));
        check!(site_filter(&registry, "document").is_none());

        let subsite = Settings {
            mode: OperatingMode::Subsite,
            ..full_settings()
        };
        check!(site_filter(&subsite.registry(), "search").is_none());
    }

    #[test]
    fn widget_settings_offer_content_source() {
        let settings = full_settings();
        let fields = widget_settings(&settings, "document");
        let source = &fields[CONTENT_SOURCE_FIELD];
        check!(source.options["maintenant"] == "This site only");
        check!(source.options["all"] == "All Sites");
        check!(source.default_value.as_deref() == Some("maintenant"));
        check!(fields.contains_key(EXTERNAL_CATEGORIES_FIELD));
        check!(widget_settings(&settings, "page").is_empty());
    }
}
