//! Decides whether a record carries a file the extraction helper should process.

use crate::config::Settings;
use crate::query::request::is_truthy;
use crate::record::{ContentRecord, MetaSlot};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Legacy size label: leading number and unit (`"2 MB"`, `"340 kb"`, `"12 b"`).
static SIZE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d.,]*)\s*(mb|kb|b)\b").expect("static size label pattern")
});

/// Sidecar key holding the descriptor of `field`.
pub fn sidecar_key(field: &str) -> String {
    format!("{}_meta", field)
}

/// Decoded `<field>_meta` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Human-readable size label
    #[serde(default, deserialize_with = "label", skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Exact size; a number or numeric string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttachmentDescriptor {
    /// Exact size in bytes, when given and non-zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // fractional or negative sizes are junk anyway
    pub fn bytes(&self) -> Option<u64> {
        let bytes = match self.size_bytes.as_ref()? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as u64),
            _ => None,
        }?;
        (bytes > 0).then_some(bytes)
    }

    /// Whether the extraction pipeline should take this file.
    pub fn is_suitable(&self, settings: &Settings) -> bool {
        let (Some(mime), Some(size)) = (self.mime.as_deref(), self.size.as_deref()) else {
            return false;
        };
        if mime.is_empty() || size.is_empty() || !settings.is_allowed_mime(mime) {
            return false;
        }

        match self.bytes() {
            Some(bytes) => bytes < settings.attachment_max_mb.saturating_mul(1_000_000),
            None => label_within(size, settings.attachment_max_mb),
        }
    }
}

/// Legacy label check: whole megabytes under the ceiling, any kilobyte or byte size.
fn label_within(label: &str, max_mb: u64) -> bool {
    let Some(caps) = SIZE_LABEL.captures(label) else {
        return false;
    };
    match caps[2].to_ascii_lowercase().as_str() {
        "mb" => {
            let whole = caps[1]
                .split(['.', ','])
                .next()
                .and_then(|n| n.parse::<u64>().ok());
            whole.is_some_and(|mb| mb < max_mb)
        }
        _ => true,
    }
}

fn label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Save cycle the record is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveContext {
    pub autosave: bool,
    /// Save triggered by a background ajax call
    pub background_ajax: bool,
}

impl SaveContext {
    const fn is_background(self) -> bool {
        self.autosave || self.background_ajax
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    /// Background save, nothing evaluated
    Skipped,
    /// A field or its sidecar is mid-write
    StillWriting,
    Ineligible,
    Eligible(AttachmentDescriptor),
}

impl Eligibility {
    /// Whether the fields were actually evaluated.
    pub const fn was_evaluated(&self) -> bool {
        matches!(self, Self::Ineligible | Self::Eligible(_))
    }
}

/// Evaluate the attachment `fields` of `record`.
///
/// Only one descriptor is returned: when several fields qualify, the last one wins.
pub fn evaluate(
    record: &ContentRecord,
    fields: &[String],
    save: SaveContext,
    settings: &Settings,
) -> Eligibility {
    if save.is_background() {
        return Eligibility::Skipped;
    }

    if fields.iter().any(|field| still_writing(record, field)) {
        tracing::debug!("Record {} still writing attachment meta, skipping", record.id);
        return Eligibility::StillWriting;
    }

    let mut eligible = None;
    for field in fields {
        let Some(descriptor) = descriptor_for(record, field) else {
            continue;
        };
        if descriptor.is_suitable(settings) {
            eligible = Some(descriptor);
        } else {
            tracing::debug!(
                "Attachment '{}' on record {} not suitable for extraction",
                field,
                record.id
            );
        }
    }

    eligible.map_or(Eligibility::Ineligible, Eligibility::Eligible)
}

fn still_writing(record: &ContentRecord, field: &str) -> bool {
    let value = record.meta_slot(field);
    let sidecar = record.meta_slot(&sidecar_key(field));
    matches!(
        (value, sidecar),
        (MetaSlot::Set(_), MetaSlot::Null) | (MetaSlot::Null, MetaSlot::Set(_))
    )
}

/// Read the sidecar of `field`, filling in the url of legacy document sidecars.
fn descriptor_for(record: &ContentRecord, field: &str) -> Option<AttachmentDescriptor> {
    let MetaSlot::Set(value) = record.meta_slot(field) else {
        return None;
    };
    if !is_truthy(value) {
        return None;
    }
    let sidecar = record.meta_str(&sidecar_key(field)).filter(|s| !s.is_empty())?;

    let mut descriptor: AttachmentDescriptor = match serde_json::from_str(sidecar) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            tracing::warn!(
                "Malformed attachment meta '{}' on record {}: {}",
                sidecar_key(field),
                record.id,
                e
            );
            return None;
        }
    };

    if descriptor.url.is_empty() {
        match (record.post_type.as_str(), value.as_str()) {
            ("document", Some(url)) => descriptor.url = url.to_string(),
            _ => return None,
        }
    }

    Some(descriptor)
}
