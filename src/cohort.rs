//! Cohort registry: the tenants sharing one search backend and how this node relates to them.

use crate::html::escape;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Scope token meaning "every tenant in the cohort".
pub const ALL_SITES: &str = "all";

/// Backend index expression used when no local index is configured.
pub const UNSCOPED_INDEX: &str = "_all";

/// One participating site. Its id is the name of its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub name: String,
    pub url: String,
    /// CSS color for the origin badge
    pub color: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Indexing only, no query-time behaviour.
    #[default]
    Agent,
    /// Queries stay on the local index; search pages carry a cohort banner.
    Subsite,
    /// Queries may federate across the whole cohort.
    Full,
}

/// Read-only view over the configured cohort.
#[derive(Debug, Clone, Copy)]
pub struct CohortRegistry<'a> {
    tenants: &'a IndexMap<String, Tenant>,
    local_id: &'a str,
    mode: OperatingMode,
}

impl<'a> CohortRegistry<'a> {
    pub const fn new(
        tenants: &'a IndexMap<String, Tenant>,
        local_id: &'a str,
        mode: OperatingMode,
    ) -> Self {
        Self {
            tenants,
            local_id,
            mode,
        }
    }

    pub const fn local_id(&self) -> &'a str {
        self.local_id
    }

    pub const fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn tenant(&self, id: &str) -> Option<&'a Tenant> {
        self.tenants.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'a str> {
        self.tenants.keys().map(String::as_str)
    }

    /// Every tenant id joined into one comma-separated index list.
    pub fn all_indices(&self) -> String {
        self.ids().collect::<Vec<_>>().join(",")
    }

    /// Index a query scoped to this node targets, or [`UNSCOPED_INDEX`] without a local id.
    pub fn local_scope(&self) -> &'a str {
        if self.local_id.is_empty() {
            UNSCOPED_INDEX
        } else {
            self.local_id
        }
    }

    /// Index list a cohort-wide query resolves to for this node.
    ///
    /// Only full mode reaches beyond the local index.
    pub fn global_alias(&self) -> String {
        match self.mode {
            OperatingMode::Full if !self.tenants.is_empty() => self.all_indices(),
            _ => self.local_scope().to_string(),
        }
    }

    /// True when a record with this origin belongs to this node.
    pub fn is_local(&self, origin: Option<&str>) -> bool {
        match origin {
            None | Some("") => true,
            Some(id) => id == self.local_id,
        }
    }

    /// Colored origin label for a foreign result. Empty for unknown tenants.
    pub fn badge(&self, id: &str) -> String {
        let Some(tenant) = self.tenant(id) else {
            if !id.is_empty() {
                tracing::debug!("No cohort entry for index '{}', skipping badge", id);
            }
            return String::new();
        };

        format!(
            r#"<span class="label" style="background-color:{}">{}</span>"#,
            escape(&tenant.color),
            escape(&tenant.name)
        )
    }

    /// Banner appended to the search page message on subsite nodes.
    pub fn search_page_message(&self, message: &str) -> String {
        if self.mode != OperatingMode::Subsite {
            return message.to_string();
        }

        let name = self
            .tenant(self.local_id)
            .map_or(self.local_id, |t| t.name.as_str());
        format!(
            r#"{}<div class="alert alert-success">You are currently searching the {} site, please visit the main site to search all content.</div>"#,
            message,
            escape(name)
        )
    }

    /// Choices for a widget's "content source" setting.
    pub fn content_source_options(&self) -> IndexMap<String, String> {
        let mut options: IndexMap<String, String> = self
            .tenants
            .iter()
            .map(|(id, tenant)| (id.clone(), tenant.name.clone()))
            .collect();
        options.insert(self.local_id.to_string(), "This site only".to_string());
        options.insert(ALL_SITES.to_string(), "All Sites".to_string());
        options
    }

    /// Choices for the per-request "search site" filter.
    pub fn site_filter_options(&self) -> IndexMap<String, String> {
        let mut options = IndexMap::new();
        options.insert(ALL_SITES.to_string(), "All Sites".to_string());
        for (id, tenant) in self.tenants {
            options.entry(id.clone()).or_insert_with(|| tenant.name.clone());
        }
        options
    }
}
