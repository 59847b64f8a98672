//! Shared test fixtures for integration tests.
//!
//! # Available Fixtures
//!
//! - `full_settings`: a full node `maintenant` in a two-tenant cohort, attachments off
//! - `attachment_settings`: same node with an extraction helper configured
//! - `subsite_settings`: same cohort seen from a subsite node
//!
//! [`TempConfig`] writes settings files into a temp directory for loader tests.

use cohort_search::attachment::{ExtractionClient, ExtractionRequest};
use cohort_search::record::MetaEntry;
use cohort_search::{ContentRecord, FormattedQuery, OperatingMode, Settings, Tenant};
use indexmap::IndexMap;
use rstest::fixture;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const LOCAL: &str = "maintenant";
pub const OTHER: &str = "othertenant";
pub const OTHER_COLOR: &str = "#2e7d32";
pub const OTHER_NAME: &str = "Parks Department";

fn cohort() -> IndexMap<String, Tenant> {
    IndexMap::from([
        (
            LOCAL.to_string(),
            Tenant {
                name: "City Hall".to_string(),
                url: "https://maintenant.example.org".to_string(),
                color: "#1565c0".to_string(),
            },
        ),
        (
            OTHER.to_string(),
            Tenant {
                name: OTHER_NAME.to_string(),
                url: "https://parks.example.org".to_string(),
                color: OTHER_COLOR.to_string(),
            },
        ),
    ])
}

#[fixture]
pub fn full_settings() -> Settings {
    Settings {
        mode: OperatingMode::Full,
        local_tenant_id: LOCAL.to_string(),
        cohort: cohort(),
        ..Settings::default()
    }
}

#[fixture]
pub fn attachment_settings() -> Settings {
    Settings {
        attachments_endpoint: Some("http://127.0.0.1:9/extract".to_string()),
        ..full_settings()
    }
}

#[fixture]
pub fn subsite_settings() -> Settings {
    Settings {
        mode: OperatingMode::Subsite,
        ..full_settings()
    }
}

/// Query body shaped like the backend's query builder output for a term search.
#[allow(dead_code)] // Used across different integration test crates
pub fn term_query(term: &str) -> FormattedQuery {
    FormattedQuery::try_from(json!({
        "from": 0,
        "size": 10,
        "query": {
            "bool": {
                "should": [
                    {
                        "multi_match": {
                            "query": term,
                            "type": "phrase",
                            "fields": ["post_title", "post_content", "terms.category.name"],
                            "boost": 4
                        }
                    },
                    {
                        "multi_match": {
                            "query": term,
                            "fields": ["post_title", "post_content"],
                            "fuzziness": 1
                        }
                    }
                ]
            }
        },
        "sort": [ { "post_date": { "order": "desc" } } ],
        "post_filter": { "match_all": {} }
    }))
    .expect("sample query body is well-formed")
}

/// A `document` record whose attachment field and sidecar are both set.
#[allow(dead_code)] // Used across different integration test crates
pub fn document_record(id: u64, url: &str, mime: &str, size: &str) -> ContentRecord {
    let mut record = ContentRecord::new(id, "document");
    record.set_meta("document", MetaEntry::new(json!(url)));
    let sidecar = json!({ "url": url, "mime": mime, "size": size });
    record.set_meta("document_meta", MetaEntry::new(Value::String(sidecar.to_string())));
    record
}

/// Extraction client that keeps every request it receives.
#[allow(dead_code)] // Used across different integration test crates
#[derive(Clone, Default)]
pub struct RecordingClient(Arc<Mutex<Vec<ExtractionRequest>>>);

#[allow(dead_code)] // Used across different integration test crates
impl RecordingClient {
    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.0.lock().expect("recorder lock").clone()
    }
}

impl ExtractionClient for RecordingClient {
    fn dispatch(&self, request: ExtractionRequest) {
        self.0.lock().expect("recorder lock").push(request);
    }
}

/// A temporary directory for settings files, removed on drop.
#[allow(dead_code)] // Used across different integration test crates
pub struct TempConfig {
    _temp: TempDir,
    root: PathBuf,
}

#[allow(dead_code)] // Used across different integration test crates
impl TempConfig {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = temp.path().to_path_buf();
        Self { _temp: temp, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Writes `content` to `name` and returns its full path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).expect("Failed to write settings file");
        path
    }
}
