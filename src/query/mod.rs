//! Query-time pipeline: routing listing/search requests to the backend and reweighting
//! the backend's native query body before execution.

pub mod aggregation;
pub mod dsl;
pub mod request;
pub mod router;
pub mod weighting;

pub use aggregation::{AggregationRequest, AggregationResults, Bucket};
pub use dsl::{FormattedQuery, Query, ScoreFunction, SortEntry};
pub use request::{FormContext, SearchRequest, SiteScope, TaxClause, TermRef};
pub use router::{QueryRouter, Routing};
pub use weighting::WeightingEngine;

/// Extracted attachment text as mapped by the ingest pipeline.
pub const ATTACHMENT_CONTENT_FIELD: &str = "attachments.attachment.content";

/// Event start date meta key.
pub const EVENT_DATE_FIELD: &str = "_event_start_local";

/// Meeting date meta key.
pub const MEETING_DATE_FIELD: &str = "datetime";
