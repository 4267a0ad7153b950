// ⚙️ Configuration - fixed business tables + run paths
//
// Organizations and phone prefixes are business data, not computed. They ship
// as built-in defaults and can be replaced wholesale by a JSON file with the
// same shape.

use crate::error::{ReconcileError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the report listing origin cards nobody reported back
pub const DEFAULT_UNMATCHED_REPORT: &str = "НЕ_найденные_у_них.csv";

/// Label in the categories field that marks the spending category
pub const DEFAULT_CATEGORY_MARKER: &str = "рублей";

// ============================================================================
// ORGANIZATIONS
// ============================================================================

/// How one organization is spelled on each side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgNames {
    /// Label used inside the external files
    pub external: String,

    /// Label used in the origin GuestCategories field
    pub origin: String,
}

impl OrgNames {
    fn new(external: &str, origin: &str) -> Self {
        OrgNames {
            external: external.to_string(),
            origin: origin.to_string(),
        }
    }
}

// ============================================================================
// REMOTE ENDPOINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub remote_dir: String,

    /// Environment variable holding the login
    #[serde(default = "default_user_env")]
    pub username_env: String,

    /// Environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    22
}

fn default_user_env() -> String {
    "RECONCILER_SFTP_USER".to_string()
}

fn default_password_env() -> String {
    "RECONCILER_SFTP_PASSWORD".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            host: "ftp.pharmasyntez.com".to_string(),
            port: default_port(),
            remote_dir: "/ftp.irk-st/Result/".to_string(),
            username_env: default_user_env(),
            password_env: default_password_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ============================================================================
// RECONCILER CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Internal org key → labels on both sides
    pub organizations: BTreeMap<String, OrgNames>,

    /// Internal org key → leading digits of minted phone numbers
    pub phone_prefixes: BTreeMap<String, String>,

    pub origin_path: PathBuf,
    pub external_dir: PathBuf,
    pub output_dir: PathBuf,

    pub unmatched_report: String,
    pub category_marker: String,

    /// Skip (and report) external rows that do not have the 17-column shape
    pub skip_malformed_rows: bool,

    pub remote: RemoteConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        let organizations: BTreeMap<String, OrgNames> = [
            ("Djinatec", OrgNames::new("ДЖИНАТЭК ООО", "ДЖИНАТЭК ООО")),
            ("FarmaFond", OrgNames::new("ООО \"ФАРМАФОНД\"", "ФАРМАФОНД ООО")),
            ("FS", OrgNames::new("Фармасинтез", "Фармасинтез ООО")),
            ("Primafarm", OrgNames::new("Примафарм", "Примафарм ООО")),
            ("Profarm", OrgNames::new("Профарм", "Профарм ООО")),
            ("PuniaNV", OrgNames::new("ИП ПунияНВ", "Пуния НВ ИП")),
            ("PuniaVS", OrgNames::new("ИП ПунияВС", "Пуния ВС ИП")),
            ("RiverPark", OrgNames::new("РИВЕР ПАРК ООО", "РИВЕР ПАРК ООО")),
            ("Sivalab", OrgNames::new("ООО \"СИВИлаб\"", "СИВИлаб ООО")),
        ]
        .into_iter()
        .map(|(key, names)| (key.to_string(), names))
        .collect();

        let phone_prefixes: BTreeMap<String, String> = [
            ("Djinatec", "7921"),
            ("FarmaFond", "7922"),
            ("FS", "7923"),
            ("Primafarm", "7924"),
            ("Profarm", "7925"),
            ("RiverPark", "7926"),
            ("Sivalab", "7927"),
            ("PuniaNV", "7929"),
            ("PuniaVS", "7930"),
        ]
        .into_iter()
        .map(|(key, prefix)| (key.to_string(), prefix.to_string()))
        .collect();

        ReconcilerConfig {
            organizations,
            phone_prefixes,
            origin_path: PathBuf::from("origin.csv"),
            external_dir: PathBuf::from("external"),
            output_dir: PathBuf::from("output"),
            unmatched_report: DEFAULT_UNMATCHED_REPORT.to_string(),
            category_marker: DEFAULT_CATEGORY_MARKER.to_string(),
            skip_malformed_rows: false,
            remote: RemoteConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Load config from a JSON file; missing keys fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ReconcilerConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Every organization needs a numeric phone prefix
    pub fn validate(&self) -> Result<()> {
        for key in self.organizations.keys() {
            let prefix = self.phone_prefixes.get(key).ok_or_else(|| {
                ReconcileError::configuration(format!("organization '{}' has no phone prefix", key))
            })?;

            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ReconcileError::configuration(format!(
                    "phone prefix '{}' of organization '{}' is not numeric",
                    prefix, key
                )));
            }
        }
        Ok(())
    }

    /// Origin labels, i.e. the allowlist matched against GuestCategories
    pub fn origin_labels(&self) -> Vec<&str> {
        self.organizations.values().map(|o| o.origin.as_str()).collect()
    }

    pub fn org_names(&self, key: &str) -> Option<&OrgNames> {
        self.organizations.get(key)
    }

    pub fn phone_prefix(&self, key: &str) -> Option<&str> {
        self.phone_prefixes.get(key).map(String::as_str)
    }
}
