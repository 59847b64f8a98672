//! Request-scoped state shared between routing, execution and form rendering.

use crate::query::AggregationResults;
use std::collections::HashSet;

/// State for one query-then-render cycle.
///
/// The router registers the filter forms whose options should reflect aggregation
/// counts; the caller records the counts once the backend answers; the facet merger
/// reads both while rendering. Nothing here outlives the request, so concurrent
/// requests never see each other's forms or counts.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Form ids opted into facet rewriting
    forms: HashSet<String>,

    /// Bucket counts from the latest query execution in this request
    aggregations: Option<AggregationResults>,
}

impl RequestContext {
    /// Create an empty request context
    pub fn new() -> Self {
        Self::default()
    }

    /// Opt a filter form into aggregation-driven option rewriting
    pub fn register_form(&mut self, form_id: &str) {
        if self.forms.insert(form_id.to_string()) {
            tracing::debug!("Registered form '{}' for facet rewriting", form_id);
        }
    }

    pub fn is_registered(&self, form_id: &str) -> bool {
        self.forms.contains(form_id)
    }

    /// Store the counts from a query execution, replacing earlier ones (last write wins)
    pub fn record_aggregations(&mut self, aggregations: AggregationResults) {
        self.aggregations = Some(aggregations);
    }

    /// Get the recorded counts, if any query in this request asked for them
    pub const fn aggregations(&self) -> Option<&AggregationResults> {
        self.aggregations.as_ref()
    }
}
