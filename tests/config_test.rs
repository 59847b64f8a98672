mod common;

use assert2::check;
use cohort_search::config::ConfigWarning;
use cohort_search::error::ConfigError;
use cohort_search::{OperatingMode, Settings};
use common::TempConfig;

/// Test: a full settings file loads.
#[test]
fn loads_full_settings() {
    let dir = TempConfig::new();
    let path = dir.write(
        "config.toml",
        r##"
mode = "full"
local_tenant_id = "maintenant"
attachments_endpoint = "http://127.0.0.1:3000/extract"
attachment_max_mb = 10

[cohort.maintenant]
name = "City Hall"
url = "https://maintenant.example.org"
color = "#1565c0"

[cohort.othertenant]
name = "Parks Department"
url = "https://parks.example.org"
color = "#2e7d32"

[taxonomies]
document = "document_taxonomy"
"##,
    );

    let settings = Settings::load(&path).unwrap();
    check!(settings.mode == OperatingMode::Full);
    check!(settings.attachments_active());
    check!(settings.attachment_max_mb == 10);
    check!(settings.registry().all_indices() == "maintenant,othertenant");
    check!(settings.taxonomy_for("document") == "document_taxonomy");
    check!(settings.taxonomy_for("post") == "category");
    check!(settings.taxonomy_for("meeting") == "meeting-taxonomy");
    check!(settings.attachment_fields_for("meeting").len() == 2);
    check!(settings.validate().is_empty());
}

/// Test: an empty file is a valid agent node with warnings.
#[test]
fn empty_file_uses_defaults() {
    let dir = TempConfig::new();
    let settings = Settings::load(&dir.write("config.toml", "")).unwrap();

    check!(settings.mode == OperatingMode::Agent);
    check!(!settings.attachments_active());
    check!(settings.is_allowed_mime("application/pdf"));
    check!(settings.validate() == vec![ConfigWarning::MissingLocalTenant]);
}

/// Test: a local index missing from the cohort is reported.
#[test]
fn local_tenant_outside_cohort_warns() {
    let dir = TempConfig::new();
    let path = dir.write(
        "config.toml",
        r#"
mode = "subsite"
local_tenant_id = "maintenant"

[cohort.othertenant]
name = "Parks"
url = "https://parks.example.org"
color = "green"
"#,
    );

    let settings = Settings::load(&path).unwrap();
    check!(settings.validate() == vec![ConfigWarning::LocalTenantNotInCohort("maintenant".to_string())]);
}

/// Test: missing and malformed files are distinct errors.
#[test]
fn load_errors() {
    let dir = TempConfig::new();

    let missing = Settings::load(&dir.path().join("absent.toml"));
    check!(matches!(missing, Err(ConfigError::NotFound { .. })));

    let broken = Settings::load(&dir.write("broken.toml", "mode = [unclosed"));
    check!(matches!(broken, Err(ConfigError::Parse { .. })));

    let bad_mode = Settings::load(&dir.write("mode.toml", "mode = \"everything\""));
    check!(matches!(bad_mode, Err(ConfigError::Parse { .. })));
}
