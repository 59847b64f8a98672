//! Node settings: operating mode, cohort registry and attachment processing switches.
//!
//! Settings are owned by the site's admin surface and consumed read-only here. They are
//! loaded from a TOML file; every field has a default so a partial file is valid.

use crate::cohort::{CohortRegistry, OperatingMode, Tenant};
use crate::error::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Attachment size ceiling in megabytes.
pub const DEFAULT_ATTACHMENT_MAX_MB: u64 = 25;

/// MIME types the backend's ingest pipeline can extract text from.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: OperatingMode,

    /// Index name of this node. Also its tenant id in the cohort.
    pub local_tenant_id: String,

    pub cohort: IndexMap<String, Tenant>,

    /// Extraction helper endpoint. Attachment processing is active iff this is set.
    pub attachments_endpoint: Option<String>,

    /// Post type -> meta fields holding an attached file.
    pub attachment_fields: BTreeMap<String, Vec<String>>,

    pub allowed_mime_types: Vec<String>,

    pub attachment_max_mb: u64,

    /// Let the backend's own date decay apply instead of our function-score envelope.
    pub decay_by_date: bool,

    /// Post type -> taxonomy used for external category filters.
    pub taxonomies: BTreeMap<String, String>,

    /// Mapping pass: always send an empty attachment list and never upsert.
    pub force_attachments: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let attachment_fields = BTreeMap::from([
            ("document".to_string(), vec!["document".to_string()]),
            (
                "meeting".to_string(),
                vec![
                    "agenda_attachment".to_string(),
                    "minutes_attachment".to_string(),
                ],
            ),
        ]);

        Self {
            mode: OperatingMode::default(),
            local_tenant_id: String::new(),
            cohort: IndexMap::new(),
            attachments_endpoint: None,
            attachment_fields,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            attachment_max_mb: DEFAULT_ATTACHMENT_MAX_MB,
            decay_by_date: false,
            taxonomies: BTreeMap::new(),
            force_attachments: false,
        }
    }
}

/// A configuration problem the operator should hear about. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    MissingLocalTenant,
    LocalTenantNotInCohort(String),
    EmptyCohort,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLocalTenant => {
                write!(f, "no local index name configured; queries stay unscoped")
            }
            Self::LocalTenantNotInCohort(id) => {
                write!(f, "local index '{}' is not registered in the search cohort", id)
            }
            Self::EmptyCohort => write!(f, "full mode is enabled but the search cohort is empty"),
        }
    }
}

impl Settings {
    /// Default settings location: `<config dir>/cohort-search/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cohort-search").join("config.toml"))
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        for warning in settings.validate() {
            tracing::warn!("cohort-search settings: {}", warning);
        }

        Ok(settings)
    }

    /// Check for problems that degrade behaviour without stopping it.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.local_tenant_id.is_empty() {
            warnings.push(ConfigWarning::MissingLocalTenant);
        } else if !self.cohort.is_empty() && !self.cohort.contains_key(&self.local_tenant_id) {
            warnings.push(ConfigWarning::LocalTenantNotInCohort(
                self.local_tenant_id.clone(),
            ));
        }

        if self.mode == OperatingMode::Full && self.cohort.is_empty() {
            warnings.push(ConfigWarning::EmptyCohort);
        }

        warnings
    }

    pub fn registry(&self) -> CohortRegistry<'_> {
        CohortRegistry::new(&self.cohort, &self.local_tenant_id, self.mode)
    }

    pub const fn attachments_active(&self) -> bool {
        self.attachments_endpoint.is_some()
    }

    /// Attachment fields configured for a post type; empty when it carries none.
    pub fn attachment_fields_for(&self, post_type: &str) -> &[String] {
        self.attachment_fields
            .get(post_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Taxonomy used when a listing of `post_type` is filtered by category ids.
    pub fn taxonomy_for(&self, post_type: &str) -> String {
        if let Some(taxonomy) = self.taxonomies.get(post_type) {
            return taxonomy.clone();
        }
        match post_type {
            "post" => "category".to_string(),
            other => format!("{}-taxonomy", other),
        }
    }

    pub fn is_allowed_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime)
    }
}
