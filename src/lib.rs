//! Federated search across a cohort of independently indexed sites sharing one search
//! backend: query routing and relevance weighting at query time, attachment-aware
//! document preparation at index time.

pub mod attachment;
pub mod cli;
pub mod cohort;
pub mod config;
pub mod context;
pub mod error;
pub mod facets;
pub mod html;
pub mod query;
pub mod record;
pub mod results;
pub mod sync;
pub mod tracing;

pub use cohort::{CohortRegistry, OperatingMode, Tenant};
pub use config::Settings;
pub use context::RequestContext;
pub use query::{FormattedQuery, QueryRouter, SearchRequest, WeightingEngine};
pub use record::ContentRecord;
pub use results::{Presenter, normalize};
pub use sync::{PreparedDocument, SyncTransformer, WriteMode};
