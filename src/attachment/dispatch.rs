//! Hand-off of eligible attachments to the extraction helper.
//!
//! Dispatch is fire-and-forget. The helper reads the file, runs it through the index's
//! ingest pipeline and writes the extracted text back itself; nothing it answers is
//! consumed here.

use crate::attachment::AttachmentDescriptor;
use crate::error::DispatchError;
use crate::record::ContentRecord;
use lru::LruCache;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Record ids remembered by the dispatch memo.
pub const MEMO_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).expect("non-zero memo capacity");

/// How long a dispatch suppresses repeats for the same record.
pub const MEMO_TTL: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `<index>/post/<id>`
pub fn indexed_post_path(index: &str, id: u64) -> String {
    format!("{}/post/{}", index.trim_end_matches('/'), id)
}

/// Document path routed through the attachment ingest pipeline.
pub fn pipeline_path(index: &str, id: u64) -> String {
    format!(
        "{}?pipeline={}-attachment",
        indexed_post_path(index, id),
        index.trim_end_matches('/')
    )
}

/// Body posted to the extraction helper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    #[serde(rename = "indexedPath")]
    pub indexed_path: String,
    pub path: String,
    pub attachments_meta: Vec<AttachmentDescriptor>,
    pub post: ContentRecord,
}

impl ExtractionRequest {
    pub fn new(index: &str, descriptor: AttachmentDescriptor, post: ContentRecord) -> Self {
        Self {
            indexed_path: indexed_post_path(index, post.id),
            path: pipeline_path(index, post.id),
            attachments_meta: vec![descriptor],
            post,
        }
    }
}

/// Receiver of extraction requests. Implementations must not block the caller.
pub trait ExtractionClient: Send + Sync {
    fn dispatch(&self, request: ExtractionRequest);
}

/// Used when no extraction helper is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractionClient;

impl ExtractionClient for NoopExtractionClient {
    fn dispatch(&self, request: ExtractionRequest) {
        tracing::debug!("No extraction helper, ignoring record {}", request.post.id);
    }
}

/// POSTs requests as JSON on the ambient tokio runtime.
#[derive(Clone)]
pub struct HttpExtractionClient {
    client: reqwest::Client,
    endpoint: Arc<str>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpExtractionClient {
    pub fn new(endpoint: &str) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: Arc::from(endpoint),
            in_flight: Arc::default(),
        })
    }

    /// Wait for every dispatch started so far. Short-lived processes call this before exit.
    pub async fn drain(&self) {
        let handles = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Extraction dispatch task failed: {}", e);
            }
        }
    }
}

impl fmt::Debug for HttpExtractionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExtractionClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ExtractionClient for HttpExtractionClient {
    fn dispatch(&self, request: ExtractionRequest) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "No async runtime, dropping extraction request for record {}",
                request.post.id
            );
            return;
        };

        let client = self.client.clone();
        let endpoint = Arc::clone(&self.endpoint);
        let task = handle.spawn(async move {
            let id = request.post.id;
            match client.post(&*endpoint).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Extraction helper accepted record {}", id);
                }
                Ok(response) => {
                    tracing::warn!(
                        "Extraction helper answered {} for record {}",
                        response.status(),
                        id
                    );
                }
                Err(e) => {
                    tracing::error!("Failed sending record {} to extraction helper: {}", id, e);
                }
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|t| !t.is_finished());
        in_flight.push(task);
    }
}

/// Suppresses dispatches repeated for the same record within [`MEMO_TTL`].
#[derive(Debug)]
pub struct DispatchMemo {
    recent: Mutex<LruCache<u64, Instant>>,
    ttl: Duration,
}

impl Default for DispatchMemo {
    fn default() -> Self {
        Self::new(MEMO_CAPACITY, MEMO_TTL)
    }
}

impl DispatchMemo {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            recent: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Record a dispatch for `id` at `now`. False when one happened within the TTL.
    pub fn claim_at(&self, id: u64, now: Instant) -> bool {
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(at) = recent.get(&id)
            && now.saturating_duration_since(*at) < self.ttl
        {
            return false;
        }
        recent.put(id, now);
        true
    }

    pub fn claim(&self, id: u64) -> bool {
        self.claim_at(id, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use serde_json::json;

    #[test]
    fn paths() {
        check!(indexed_post_path("maintenant", 42) == "maintenant/post/42");
        check!(pipeline_path("maintenant/", 42) == "maintenant/post/42?pipeline=maintenant-attachment");
    }

    #[test]
    fn request_body_shape() {
        let descriptor: AttachmentDescriptor = serde_json::from_value(json!({
            "url": "https://x/a.pdf", "mime": "application/pdf", "size": "1 MB"
        }))
        .unwrap();
        let mut post = ContentRecord::new(9, "document");
        post.attachments = Some(vec!["https://x/a.pdf".to_string()]);

        let body = serde_json::to_value(ExtractionRequest::new("maintenant", descriptor, post)).unwrap();
        check!(body["indexedPath"] == "maintenant/post/9");
        check!(body["path"] == "maintenant/post/9?pipeline=maintenant-attachment");
        check!(body["attachments_meta"][0]["url"] == "https://x/a.pdf");
        check!(body["post"]["ID"] == 9);
        check!(body["post"]["attachments"] == json!(["https://x/a.pdf"]));
    }

    #[test]
    fn memo_suppresses_repeats_within_ttl() {
        let memo = DispatchMemo::default();
        let start = Instant::now();
        check!(memo.claim_at(1, start));
        check!(!memo.claim_at(1, start + Duration::from_secs(1)));
        check!(memo.claim_at(2, start + Duration::from_secs(1)));
        check!(memo.claim_at(1, start + MEMO_TTL));
    }

    #[test]
    fn memo_forgets_least_recent_ids() {
        let memo = DispatchMemo::new(NonZeroUsize::MIN, MEMO_TTL);
        let now = Instant::now();
        check!(memo.claim_at(1, now));
        check!(memo.claim_at(2, now));
        check!(memo.claim_at(1, now));
    }

    #[test]
    fn http_client_without_runtime_drops_quietly() {
        let client = HttpExtractionClient::new("http://127.0.0.1:9/extract").unwrap();
        let descriptor: AttachmentDescriptor =
            serde_json::from_value(json!({ "url": "u", "mime": "application/pdf", "size": "1 kb" })).unwrap();
        client.dispatch(ExtractionRequest::new("maintenant", descriptor, ContentRecord::new(1, "document")));
        check!(client.in_flight.lock().unwrap().is_empty());
    }
}
