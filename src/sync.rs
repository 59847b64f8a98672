//! Last-step rewrite of content records before they are written to the index.
//!
//! The transformer swaps rendered event markup for stored content, attaches thumbnail
//! markup, hands eligible attachments to the extraction helper and decides whether the
//! write is a plain index or an upsert that keeps previously extracted text.

use crate::attachment::dispatch::{DispatchMemo, ExtractionClient, ExtractionRequest, indexed_post_path};
use crate::attachment::{Eligibility, SaveContext, evaluate};
use crate::config::Settings;
use crate::record::{ContentRecord, MetaEntry};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Meta key carrying rendered thumbnail markup.
pub const THUMBNAILS_META: &str = "post_thumbnails";

/// Image sizes rendered into [`THUMBNAILS_META`], in order.
pub const THUMBNAIL_SIZES: [&str; 4] = ["default", "card-thumb", "large", "featured-teaser"];

/// Protected meta keys the index mapping must include.
pub const PROTECTED_META_KEYS: [&str; 3] = ["_event_start_local", "list_exclude", THUMBNAILS_META];

/// Read access to the content store the records come from.
pub trait ContentStore {
    /// Stored (unrendered) body of a record.
    fn live_content(&self, id: u64) -> Option<String>;

    fn has_thumbnail(&self, id: u64) -> bool;

    /// Image markup of the record's thumbnail at `size`; empty when that size is missing.
    fn thumbnail_markup(&self, id: u64, size: &str) -> String;
}

/// Content store held in memory, loadable from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryContentStore {
    pub content: HashMap<u64, String>,
    /// Record id -> size -> markup
    pub thumbnails: HashMap<u64, HashMap<String, String>>,
}

impl ContentStore for MemoryContentStore {
    fn live_content(&self, id: u64) -> Option<String> {
        self.content.get(&id).cloned()
    }

    fn has_thumbnail(&self, id: u64) -> bool {
        self.thumbnails.contains_key(&id)
    }

    fn thumbnail_markup(&self, id: u64, size: &str) -> String {
        self.thumbnails
            .get(&id)
            .and_then(|sizes| sizes.get(size))
            .cloned()
            .unwrap_or_default()
    }
}

/// How the prepared document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Full overwrite
    Index,
    /// Merge into the stored document, insert when absent
    Upsert,
}

impl WriteMode {
    pub const fn method(self) -> &'static str {
        match self {
            Self::Index => "PUT",
            Self::Upsert => "POST",
        }
    }

    pub fn request_path(self, document_path: &str) -> String {
        match self {
            Self::Index => document_path.to_string(),
            Self::Upsert => format!("{}/_update", document_path),
        }
    }

    pub fn request_body(self, document: Value) -> Value {
        match self {
            Self::Index => document,
            Self::Upsert => json!({ "doc": document, "doc_as_upsert": true }),
        }
    }
}

/// A record ready to be sent, with the way to send it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub record: ContentRecord,
    pub write_mode: WriteMode,
}

impl PreparedDocument {
    pub fn request_path(&self, index: &str) -> String {
        self.write_mode
            .request_path(&indexed_post_path(index, self.record.id))
    }

    pub fn request_body(&self) -> Result<Value, serde_json::Error> {
        Ok(self.write_mode.request_body(serde_json::to_value(&self.record)?))
    }
}

pub struct SyncTransformer<'a> {
    settings: &'a Settings,
    store: Box<dyn ContentStore + 'a>,
    client: Box<dyn ExtractionClient + 'a>,
    memo: DispatchMemo,
}

impl std::fmt::Debug for SyncTransformer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTransformer")
            .field("index", &self.settings.local_tenant_id)
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}

impl<'a> SyncTransformer<'a> {
    pub fn new(
        settings: &'a Settings,
        store: impl ContentStore + 'a,
        client: impl ExtractionClient + 'a,
    ) -> Self {
        Self {
            settings,
            store: Box::new(store),
            client: Box::new(client),
            memo: DispatchMemo::default(),
        }
    }

    #[must_use]
    pub fn with_memo(mut self, memo: DispatchMemo) -> Self {
        self.memo = memo;
        self
    }

    /// Rewrite `record` for indexing.
    pub fn prepare(&self, mut record: ContentRecord, save: SaveContext) -> PreparedDocument {
        if record.post_type == "event"
            && let Some(content) = self.store.live_content(record.id)
        {
            record.post_content = content;
        }

        self.attach_thumbnails(&mut record);

        let fields = self.settings.attachment_fields_for(&record.post_type);
        if self.settings.attachments_active() {
            if fields.is_empty() {
                record.attachments = Some(Vec::new());
            } else {
                self.process_attachments(&mut record, fields, save);
                if self.settings.force_attachments {
                    record.attachments = Some(Vec::new());
                }
            }
        }

        let write_mode = if self.settings.attachments_active()
            && !fields.is_empty()
            && !self.settings.force_attachments
        {
            WriteMode::Upsert
        } else {
            WriteMode::Index
        };

        PreparedDocument { record, write_mode }
    }

    fn attach_thumbnails(&self, record: &mut ContentRecord) {
        if !self.store.has_thumbnail(record.id) {
            return;
        }

        let images: IndexMap<&str, String> = THUMBNAIL_SIZES
            .iter()
            .map(|size| (*size, self.store.thumbnail_markup(record.id, size)))
            .collect();
        let value = match serde_json::to_string(&images) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("Could not encode thumbnails for record {}: {}", record.id, e);
                return;
            }
        };

        record.set_meta(THUMBNAILS_META, thumbnail_entry(value));
    }

    fn process_attachments(&self, record: &mut ContentRecord, fields: &[String], save: SaveContext) {
        let eligibility = evaluate(record, fields, save, self.settings);
        if !eligibility.was_evaluated() {
            return;
        }

        record.attachments = Some(Vec::new());
        let Eligibility::Eligible(descriptor) = eligibility else {
            return;
        };

        if self.memo.claim(record.id) {
            let mut post = record.clone();
            post.attachments = Some(vec![descriptor.url.clone()]);
            tracing::info!("Dispatching attachment {} of record {}", descriptor.url, record.id);
            self.client.dispatch(ExtractionRequest::new(
                &self.settings.local_tenant_id,
                descriptor,
                post,
            ));
        } else {
            tracing::debug!("Record {} dispatched moments ago, skipping", record.id);
        }

        // The helper writes the extracted text; leave the stored copy alone.
        record.attachments = None;
    }
}

/// Meta entry with the typed columns pinned to fixed placeholders so the mapping
/// never guesses a type from markup.
fn thumbnail_entry(markup_json: String) -> MetaEntry {
    let mut typed = Map::new();
    typed.insert("raw".to_string(), json!("0"));
    typed.insert("long".to_string(), json!(0));
    typed.insert("double".to_string(), json!(0.0));
    typed.insert("boolean".to_string(), json!(false));
    typed.insert("date".to_string(), json!("1971-01-01"));
    typed.insert("datetime".to_string(), json!("1971-01-01 00:00:01"));
    typed.insert("time".to_string(), json!("00:00:01"));
    MetaEntry {
        value: Value::String(markup_json),
        typed,
    }
}

/// Add the protected meta keys this crate indexes to `keys`.
pub fn extend_protected_meta_keys(keys: &mut Vec<String>) {
    for key in PROTECTED_META_KEYS {
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<ExtractionRequest>>>);

    impl ExtractionClient for Recorder {
        fn dispatch(&self, request: ExtractionRequest) {
            self.0.lock().unwrap().push(request);
        }
    }

    fn settings() -> Settings {
        Settings {
            local_tenant_id: "maintenant".to_string(),
            attachments_endpoint: Some("http://helper.local".to_string()),
            ..Settings::default()
        }
    }

    fn eligible_document(id: u64) -> ContentRecord {
        let mut record = ContentRecord::new(id, "document");
        record.set_meta("document", MetaEntry::new(json!("https://x/a.pdf")));
        let sidecar = json!({ "url": "https://x/a.pdf", "mime": "application/pdf", "size": "2 MB" });
        record.set_meta("document_meta", MetaEntry::new(Value::String(sidecar.to_string())));
        record
    }

    #[test]
    fn event_content_comes_from_store() {
        let settings = Settings::default();
        let store = MemoryContentStore {
            content: HashMap::from([(4, "raw body".to_string())]),
            ..MemoryContentStore::default()
        };
        let transformer = SyncTransformer::new(&settings, store, Recorder::default());
        let mut record = ContentRecord::new(4, "event");
        record.post_content = "<div>rendered</div>".to_string();

        let prepared = transformer.prepare(record, SaveContext::default());
        check!(prepared.record.post_content == "raw body");
        check!(prepared.write_mode == WriteMode::Index);
    }

    #[test]
    fn thumbnails_are_encoded_with_placeholders() {
        let settings = Settings::default();
        let store = MemoryContentStore {
            thumbnails: HashMap::from([(
                2,
                HashMap::from([("default".to_string(), "<img src=\"a.jpg\">".to_string())]),
            )]),
            ..MemoryContentStore::default()
        };
        let transformer = SyncTransformer::new(&settings, store, Recorder::default());
        let prepared = transformer.prepare(ContentRecord::new(2, "page"), SaveContext::default());

        let entries = prepared.record.meta[THUMBNAILS_META].as_ref().unwrap();
        check!(entries.len() == 1);
        let images: Value = serde_json::from_str(entries[0].value.as_str().unwrap()).unwrap();
        check!(images == json!({ "default": "<img src=\"a.jpg\">", "card-thumb": "", "large": "", "featured-teaser": "" }));
        check!(entries[0].typed["datetime"] == "1971-01-01 00:00:01");
        check!(entries[0].typed["boolean"] == false);
    }

    #[test]
    fn no_thumbnail_leaves_meta_alone() {
        let settings = Settings::default();
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), Recorder::default());
        let prepared = transformer.prepare(ContentRecord::new(2, "page"), SaveContext::default());
        check!(prepared.record.meta.is_empty());
    }

    #[test]
    fn eligible_attachment_is_dispatched_then_cleared() {
        let settings = settings();
        let recorder = Recorder::default();
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), recorder.clone());

        let prepared = transformer.prepare(eligible_document(8), SaveContext::default());
        check!(prepared.record.attachments.is_none());
        check!(prepared.write_mode == WriteMode::Upsert);

        let sent = recorder.0.lock().unwrap();
        check!(sent.len() == 1);
        check!(sent[0].path == "maintenant/post/8?pipeline=maintenant-attachment");
        check!(sent[0].post.attachments == Some(vec!["https://x/a.pdf".to_string()]));
    }

    #[test]
    fn ineligible_attachment_gets_empty_list() {
        let settings = settings();
        let recorder = Recorder::default();
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), recorder.clone());

        let mut record = ContentRecord::new(3, "document");
        record.set_meta("document", MetaEntry::new(json!("https://x/a.png")));
        let prepared = transformer.prepare(record, SaveContext::default());
        check!(prepared.record.attachments == Some(Vec::new()));
        check!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn background_save_leaves_attachments_untouched() {
        let settings = settings();
        let recorder = Recorder::default();
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), recorder.clone());
        let save = SaveContext {
            background_ajax: true,
            ..SaveContext::default()
        };
        let prepared = transformer.prepare(eligible_document(8), save);
        check!(prepared.record.attachments.is_none());
        check!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn force_flag_always_sends_empty_list_and_indexes() {
        let settings = Settings {
            force_attachments: true,
            ..settings()
        };
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), Recorder::default());
        let prepared = transformer.prepare(eligible_document(8), SaveContext::default());
        check!(prepared.record.attachments == Some(Vec::new()));
        check!(prepared.write_mode == WriteMode::Index);
    }

    #[test]
    fn types_without_attachment_fields_get_empty_list() {
        let settings = settings();
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), Recorder::default());
        let prepared = transformer.prepare(ContentRecord::new(1, "page"), SaveContext::default());
        check!(prepared.record.attachments == Some(Vec::new()));
        check!(prepared.write_mode == WriteMode::Index);
    }

    #[test]
    fn attachments_inactive_touch_nothing() {
        let settings = Settings::default();
        let transformer = SyncTransformer::new(&settings, MemoryContentStore::default(), Recorder::default());
        let prepared = transformer.prepare(eligible_document(8), SaveContext::default());
        check!(prepared.record.attachments.is_none());
        check!(prepared.write_mode == WriteMode::Index);
    }

    #[test]
    fn upsert_wraps_body_and_path() {
        let prepared = PreparedDocument {
            record: ContentRecord::new(5, "document"),
            write_mode: WriteMode::Upsert,
        };
        check!(prepared.request_path("maintenant") == "maintenant/post/5/_update");
        let body = prepared.request_body().unwrap();
        check!(body["doc_as_upsert"] == true);
        check!(body["doc"]["ID"] == 5);
        check!(prepared.write_mode.method() == "POST");
    }

    #[test]
    fn protected_keys_are_added_once() {
        let mut keys = vec!["list_exclude".to_string(), "custom".to_string()];
        extend_protected_meta_keys(&mut keys);
        check!(keys == vec!["list_exclude", "custom", "_event_start_local", "post_thumbnails"]);
    }
}
