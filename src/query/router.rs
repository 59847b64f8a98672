//! Decides whether a listing/search request goes to the search backend, and scopes it.

use crate::cohort::{ALL_SITES, OperatingMode, UNSCOPED_INDEX};
use crate::config::Settings;
use crate::context::RequestContext;
use crate::html::encode_term;
use crate::query::request::{FormContext, SearchRequest, SiteScope, TaxClause, TermRef, non_empty};
use crate::query::{ATTACHMENT_CONTENT_FIELD, AggregationRequest, EVENT_DATE_FIELD, MEETING_DATE_FIELD};
use regex::Regex;
use std::sync::LazyLock;

static NOT_ID_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9,]").expect("static id-list pattern"));

/// Outcome of [`QueryRouter::route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// The request was flagged for the search backend
    Federated,
    /// Left untouched for the local query path
    Local,
}

/// Rewrites listing/search requests for the shared backend.
#[derive(Debug, Clone, Copy)]
pub struct QueryRouter<'a> {
    settings: &'a Settings,
}

impl<'a> QueryRouter<'a> {
    pub const fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Flag, scope and decorate `request` for the backend.
    ///
    /// Requests that come from neither a search surface nor a listing widget are left
    /// untouched and report [`Routing::Local`].
    pub fn route(
        &self,
        request: &mut SearchRequest,
        form: &FormContext,
        ctx: &mut RequestContext,
    ) -> Routing {
        if self.settings.mode == OperatingMode::Agent {
            return Routing::Local;
        }

        let run = request.ajax_search
            || request.teaser_search
            || request.teaser_query
            || form.content_source().is_some();
        if !run {
            return Routing::Local;
        }

        if request.ajax_search {
            federate(request);
            tracing::debug!("Routing ajax search to the cohort");
            return Routing::Federated;
        }

        if form.widget_type().is_none() {
            return Routing::Local;
        }

        federate(request);
        if self.settings.mode == OperatingMode::Full {
            self.apply_index_filters(request, form);
        }

        if request.teaser_search {
            if let Some(form_id) = form.form_id() {
                ctx.register_form(form_id);
                request.aggs = Some(AggregationRequest::post_types());
            }
        } else {
            apply_listing(request, form, ctx);
        }

        tracing::debug!(
            "Routed {} request to '{}'",
            form.widget_type().unwrap_or_default(),
            self.target_indices(request)
        );
        Routing::Federated
    }

    /// Narrow the request to the indices picked in the widget form or its settings.
    fn apply_index_filters(&self, request: &mut SearchRequest, form: &FormContext) {
        if let Some(index) = non_empty(form.form_instance.filter_index.as_deref())
            && index != ALL_SITES
        {
            request.filter_index = Some(index.to_string());
        }

        let Some(source) = form.content_source() else {
            return;
        };

        request.filter_index = Some(if source == ALL_SITES {
            self.settings.registry().all_indices()
        } else {
            source.to_string()
        });

        if source != self.settings.local_tenant_id
            && let Some(categories) = non_empty(form.options.external_categories.as_deref())
        {
            self.add_external_categories(request, form, categories);
        }
    }

    /// Append category ids from another site to the first taxonomy clause.
    fn add_external_categories(&self, request: &mut SearchRequest, form: &FormContext, raw: &str) {
        let ids: Vec<TermRef> = NOT_ID_LIST
            .replace_all(raw, "")
            .split(',')
            .filter(|piece| !piece.is_empty())
            .filter_map(|piece| piece.parse::<i64>().ok())
            .map(TermRef::Id)
            .collect();

        if ids.is_empty() {
            tracing::debug!("External category list '{}' holds no ids", raw);
            return;
        }

        let has_terms = request
            .tax_query
            .first()
            .is_some_and(|clause| !clause.terms.is_empty());
        if !has_terms {
            let taxonomy = form.taxonomy().map_or_else(
                || {
                    let post_type = request
                        .post_type
                        .as_ref()
                        .and_then(|types| types.primary())
                        .unwrap_or("post");
                    self.settings.taxonomy_for(post_type)
                },
                str::to_string,
            );
            request.tax_query = vec![TaxClause::any_of(&taxonomy, "term_id", Vec::new())];
        }

        if let Some(clause) = request.tax_query.first_mut() {
            clause.terms.extend(ids);
        }
    }

    /// Index list the request will be executed against.
    pub fn target_indices(&self, request: &SearchRequest) -> String {
        if let Some(index) = non_empty(request.filter_index.as_deref()) {
            return index.to_string();
        }

        let registry = self.settings.registry();
        let indices = match &request.site_scope {
            None | Some(SiteScope::Current) => registry.local_scope().to_string(),
            Some(SiteScope::All) => registry.global_alias(),
            Some(_) if self.settings.mode != OperatingMode::Full => registry.local_scope().to_string(),
            Some(SiteScope::Tenant(id)) => id.clone(),
            Some(SiteScope::Tenants(ids)) => ids.join(","),
        };
        if indices.is_empty() {
            UNSCOPED_INDEX.to_string()
        } else {
            indices
        }
    }

    /// Backend path for the search call.
    pub fn search_path(&self, request: &SearchRequest) -> String {
        format!("{}/post/_search", self.target_indices(request))
    }

    /// Backend search field list, extended with extracted attachment text when active.
    ///
    /// Agent nodes leave the list as given.
    pub fn search_fields(&self, mut fields: Vec<String>) -> Vec<String> {
        if self.settings.mode == OperatingMode::Agent {
            return fields;
        }
        if self.settings.attachments_active() {
            fields.push(ATTACHMENT_CONTENT_FIELD.to_string());
        }
        fields
    }
}

/// Whether the backend integration should take over this request.
pub const fn integrate_enabled(request: &SearchRequest) -> bool {
    request.integrate
}

/// Search results render as `search` whenever a term was entered.
pub fn display_type<'a>(default: &'a str, request: &SearchRequest) -> &'a str {
    if request.search_term().is_some() {
        "search"
    } else {
        default
    }
}

fn federate(request: &mut SearchRequest) {
    request.integrate = true;
    request.site_scope = Some(SiteScope::All);
}

fn apply_listing(request: &mut SearchRequest, form: &FormContext, ctx: &mut RequestContext) {
    if let Some(key) = request.meta_key.as_deref()
        && (key == EVENT_DATE_FIELD || key == MEETING_DATE_FIELD)
    {
        request.orderby = Some(format!("meta.{}.datetime", key));
    }

    let (Some(taxonomy), Some(form_id)) = (form.taxonomy(), form.form_id()) else {
        return;
    };

    ctx.register_form(form_id);

    let picked = &form.form_instance.filter_categories;
    if !picked.is_empty() {
        let names = picked
            .iter()
            .map(|name| TermRef::Name(encode_term(name)))
            .collect();
        request.tax_query = vec![TaxClause::any_of(taxonomy, "name", names)];
    }

    request.aggs = Some(AggregationRequest::categories(taxonomy));
}
