//! Outgoing content record as produced by the indexing layer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stored meta value plus the typed columns the index maps it into
/// (`raw`, `long`, `double`, `boolean`, `date`, `datetime`, `time`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub typed: Map<String, Value>,
}

impl MetaEntry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            typed: Map::new(),
        }
    }
}

/// State of a meta key on a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetaSlot<'a> {
    Absent,
    /// Present but null: the value is still being written
    Null,
    Set(&'a Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    #[serde(rename = "ID")]
    pub id: u64,
    pub post_type: String,
    #[serde(default)]
    pub post_content: String,
    /// `None` entries are keys sent as `null`
    #[serde(default)]
    pub meta: IndexMap<String, Option<Vec<MetaEntry>>>,
    /// Attachment file list; `None` leaves whatever the index holds untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentRecord {
    pub fn new(id: u64, post_type: impl Into<String>) -> Self {
        Self {
            id,
            post_type: post_type.into(),
            post_content: String::new(),
            meta: IndexMap::new(),
            attachments: None,
            extra: Map::new(),
        }
    }

    /// First stored value of `key`.
    pub fn meta_slot(&self, key: &str) -> MetaSlot<'_> {
        match self.meta.get(key) {
            None => MetaSlot::Absent,
            Some(None) => MetaSlot::Null,
            Some(Some(entries)) => match entries.first() {
                None => MetaSlot::Absent,
                Some(entry) if entry.value.is_null() => MetaSlot::Null,
                Some(entry) => MetaSlot::Set(&entry.value),
            },
        }
    }

    /// First stored value of `key` as a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        match self.meta_slot(key) {
            MetaSlot::Set(value) => value.as_str(),
            _ => None,
        }
    }

    /// Replace every entry of `key` with a single one.
    pub fn set_meta(&mut self, key: &str, entry: MetaEntry) {
        self.meta.insert(key.to_string(), Some(vec![entry]));
    }
}
