//! Turning backend hits into displayable records, and dressing up records that come
//! from another tenant.

use crate::cohort::{CohortRegistry, OperatingMode};
use crate::config::Settings;
use crate::html::escape_except_emphasis;
use crate::query::ATTACHMENT_CONTENT_FIELD;
use crate::sync::THUMBNAILS_META;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Highlight fragments kept per field.
pub const MAX_FRAGMENTS: usize = 10;

pub const FRAGMENT_SEPARATOR: &str = r#" <span class="search-seperator">...</span> "#;

/// Highlight key attachment matches are stored under.
pub const ATTACHMENT_HIGHLIGHT: &str = "attachments";

/// Link title exempt from badging.
const SEE_MORE: &str = "See more";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
    #[serde(default)]
    pub highlight: Option<IndexMap<String, Vec<String>>>,
}

/// A hit's source fields plus origin tenant and joined highlight snippets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentedRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub search_highlight: IndexMap<String, String>,
}

impl PresentedRecord {
    fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn permalink(&self) -> Option<&str> {
        self.field_str("permalink")
    }

    /// Decoded thumbnail markup map, if the record carries one.
    pub fn thumbnails(&self) -> Option<Map<String, Value>> {
        let raw = self
            .fields
            .get("meta")?
            .get(THUMBNAILS_META)?
            .get(0)?
            .get("value")?
            .as_str()
            .filter(|s| !s.is_empty())?;

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(sizes)) => Some(sizes),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Unreadable thumbnail meta: {}", e);
                None
            }
        }
    }
}

/// Tag a hit with its origin and flatten its highlight fragments.
pub fn normalize(hit: Hit) -> PresentedRecord {
    let mut fields = hit.source;
    fields.remove("highlight");

    let search_highlight = hit
        .highlight
        .unwrap_or_default()
        .into_iter()
        .map(|(field, fragments)| {
            let text = fragments
                .iter()
                .take(MAX_FRAGMENTS)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(FRAGMENT_SEPARATOR);
            let key = if field == ATTACHMENT_CONTENT_FIELD {
                ATTACHMENT_HIGHLIGHT.to_string()
            } else {
                field
            };
            (key, text)
        })
        .collect();

    PresentedRecord {
        fields,
        site_id: hit.index,
        search_highlight,
    }
}

/// Arguments of a search result link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLinkArgs {
    pub url: String,
    pub data_attributes: String,
    pub title: String,
    /// Markup appended after the link
    pub suffix: String,
}

/// Display overrides for records from other tenants.
#[derive(Debug, Clone, Copy)]
pub struct Presenter<'a> {
    registry: CohortRegistry<'a>,
}

impl<'a> Presenter<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            registry: settings.registry(),
        }
    }

    /// Whether `record` belongs to this node. Agent nodes treat everything as local.
    pub fn is_local(&self, record: &PresentedRecord) -> bool {
        self.registry.mode() == OperatingMode::Agent
            || self.registry.is_local(record.site_id.as_deref())
    }

    fn badge(&self, record: &PresentedRecord) -> String {
        record
            .site_id
            .as_deref()
            .map(|id| self.registry.badge(id))
            .unwrap_or_default()
    }

    pub fn title(&self, record: &PresentedRecord, title: &str) -> String {
        if self.is_local(record) {
            return title.to_string();
        }
        format!(
            r#"<span class="title-span">{}</span>{}"#,
            title,
            self.badge(record)
        )
    }

    /// Foreign records link to their own site.
    pub fn permalink(&self, record: &PresentedRecord, local: &str) -> String {
        if self.is_local(record) {
            return local.to_string();
        }
        record.permalink().unwrap_or(local).to_string()
    }

    pub fn post_classes(&self, record: &PresentedRecord, mut classes: Vec<String>) -> Vec<String> {
        if !self.is_local(record) {
            classes.push("external-post".to_string());
        }
        classes
    }

    pub fn search_post_args(&self, record: &PresentedRecord, mut args: SearchLinkArgs) -> SearchLinkArgs {
        if args.title != SEE_MORE && !self.is_local(record) {
            args.data_attributes.clear();
            args.suffix = self.badge(record);
        }
        args
    }

    /// Ajax search payload; in-page actions are dropped for foreign records.
    pub fn ajax_post(&self, record: &PresentedRecord, mut post: Map<String, Value>) -> Map<String, Value> {
        if self.is_local(record) {
            return post;
        }
        for key in ["action_attr", "action_hash", "action_url"] {
            post.insert(key.to_string(), Value::String(String::new()));
        }
        post.insert("type".to_string(), Value::String("external".to_string()));
        post.insert("suffix".to_string(), Value::String(self.badge(record)));
        post
    }

    pub fn has_thumbnail(&self, record: &PresentedRecord, local: bool) -> bool {
        if !self.is_local(record) && record.thumbnails().is_some() {
            return true;
        }
        local
    }

    /// Thumbnail markup for a foreign record at `size`, falling back to `default`.
    pub fn thumbnail(&self, record: &PresentedRecord, size: Option<&str>, local: String) -> String {
        if self.is_local(record) {
            return local;
        }
        let Some(sizes) = record.thumbnails() else {
            return local;
        };

        let pick = |key: &str| sizes.get(key).and_then(Value::as_str).filter(|m| !m.is_empty());
        size.and_then(pick)
            .or_else(|| pick("default"))
            .unwrap_or_default()
            .to_string()
    }

    pub fn search_page_message(&self, message: &str) -> String {
        self.registry.search_page_message(message)
    }
}

/// Matched-snippet block for a search result. Empty without highlights.
pub fn matching_snippets(record: &PresentedRecord) -> String {
    if record.search_highlight.is_empty() {
        return String::new();
    }

    let mut out = String::from(r#"<div class="matching">"#);
    for (field, text) in &record.search_highlight {
        let text = escape_except_emphasis(text);
        if field == ATTACHMENT_HIGHLIGHT {
            let _ = write!(
                out,
                r#"<p><small><i aria-hidden="true" class="fa fa-info-circle"></i> <strong class="match-label">Matched in attachment:</strong> "... {} ..."</small></p>"#,
                text
            );
        } else {
            let _ = write!(out, r#"<p><small>"... {} ..."</small></p>"#, text);
        }
    }
    out.push_str("</div>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use serde_json::json;

    fn hit(index: &str) -> Hit {
        serde_json::from_value(json!({
            "_index": index,
            "_source": { "ID": 1, "post_title": "Pool hours", "permalink": "https://other.example.org/pool" },
            "highlight": {
                "post_content": ["the <em>pool</em> opens", "second"],
                "attachments.attachment.content": ["<em>pool</em> schedule"]
            }
        }))
        .unwrap()
    }

    #[test]
    fn normalize_sets_origin_and_joins_fragments() {
        let record = normalize(hit("othertenant"));
        check!(record.site_id.as_deref() == Some("othertenant"));
        check!(record.search_highlight["post_content"] == r#"the <em>pool</em> opens <span class="search-seperator">...</span> second"#);
        check!(record.search_highlight["attachments"] == "<em>pool</em> schedule");
        check!(!record.search_highlight.contains_key(ATTACHMENT_CONTENT_FIELD));
    }

    #[test]
    fn fragments_are_capped() {
        let fragments: Vec<String> = (0..15).map(|i| i.to_string()).collect();
        let hit = Hit {
            index: None,
            source: Map::new(),
            highlight: Some(IndexMap::from([("post_content".to_string(), fragments)])),
        };
        let record = normalize(hit);
        check!(record.search_highlight["post_content"].matches("search-seperator").count() == 9);
    }

    #[test]
    fn snippets_label_attachment_matches_and_escape() {
        let mut record = PresentedRecord::default();
        record.search_highlight.insert("attachments".into(), "<em>pool</em> <b>x</b>".into());
        let html = matching_snippets(&record);
        check!(html.contains("Matched in attachment:"));
        check!(html.contains("<em>pool</em> &lt;b&gt;x&lt;/b&gt;"));
        check!(matching_snippets(&PresentedRecord::default()).is_empty());
    }

    #[test]
    fn foreign_thumbnail_picks_size_then_default() {
        let thumbs = json!({ "default": "<img d>", "large": "<img l>", "card-thumb": "" }).to_string();
        let record = PresentedRecord {
            fields: json!({ "meta": { "post_thumbnails": [ { "value": thumbs } ] } })
                .as_object()
                .cloned()
                .unwrap(),
            site_id: Some("othertenant".into()),
            ..PresentedRecord::default()
        };
        let settings = Settings {
            mode: OperatingMode::Full,
            local_tenant_id: "maintenant".into(),
            ..Settings::default()
        };
        let presenter = Presenter::new(&settings);
        check!(presenter.has_thumbnail(&record, false));
        check!(presenter.thumbnail(&record, Some("large"), String::new()) == "<img l>");
        check!(presenter.thumbnail(&record, Some("card-thumb"), String::new()) == "<img d>");
        check!(presenter.thumbnail(&record, None, String::new()) == "<img d>");
    }
}
