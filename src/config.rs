use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Coordinate, DatasetKind};
use crate::error::JobError;
use crate::geocode::StaticOverrides;
use crate::normalize::DEFAULT_PREFECTURE;
use crate::schema::SchemaVersion;
use crate::storage::R2Credentials;

pub const DEFAULT_DOCUMENT_ID: &str = "1Wa3EltKUwq2-d8W8s6QlJ7TIEC83kc8131xuX9q_5OI";
pub const DEFAULT_INFO_TAB: &str = "0";

/// Sheet tab (`gid`) for each dataset.
///
/// Only the info tab has a known id (`0`). Road, support and store must be set through
/// `SHEET_GID_ROAD`, `SHEET_GID_SUPPORT` and `SHEET_GID_STORE`; a tab left unset fails
/// only its own dataset with [`JobError::MissingConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabIds {
    pub info: Option<String>,
    pub road: Option<String>,
    pub support: Option<String>,
    pub store: Option<String>,
}

impl TabIds {
    pub fn get(&self, kind: DatasetKind) -> Option<&str> {
        match kind {
            DatasetKind::Info => self.info.as_deref(),
            DatasetKind::Road => self.road.as_deref(),
            DatasetKind::Support => self.support.as_deref(),
            DatasetKind::Store => self.store.as_deref(),
        }
    }

    pub fn env_name(kind: DatasetKind) -> &'static str {
        match kind {
            DatasetKind::Info => "SHEET_GID_INFO",
            DatasetKind::Road => "SHEET_GID_ROAD",
            DatasetKind::Support => "SHEET_GID_SUPPORT",
            DatasetKind::Store => "SHEET_GID_STORE",
        }
    }
}

#[derive(Clone)]
pub struct JobConfig {
    pub storage: R2Credentials,
    pub geocode_api_key: String,
    pub document_id: String,
    pub tabs: TabIds,
    pub info_schema: SchemaVersion,
    pub prefecture: String,
    pub overrides_path: Option<PathBuf>,
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("account_id", &self.storage.account_id)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.storage.bucket)
            .field("geocode_api_key", &"<redacted>")
            .field("document_id", &self.document_id)
            .field("tabs", &self.tabs)
            .field("info_schema", &self.info_schema)
            .field("prefecture", &self.prefecture)
            .field("overrides_path", &self.overrides_path)
            .finish()
    }
}

impl JobConfig {
    pub fn from_env() -> Result<Self, JobError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, JobError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required =
            |name: &str| optional(name).ok_or_else(|| JobError::MissingConfig(name.to_string()));

        let storage = R2Credentials {
            account_id: required("CLOUDFLARE_ACCOUNT_ID")?,
            access_key_id: required("CLOUDFLARE_ACCESS_KEY_ID")?,
            secret_access_key: required("CLOUDFLARE_SECRET_ACCESS_KEY")?,
            bucket: required("CLOUDFLARE_R2_BUCKET")?,
        };
        let geocode_api_key = required("GOOGLE_MAPS_API_KEY")?;

        let tabs = TabIds {
            info: optional(TabIds::env_name(DatasetKind::Info))
                .or_else(|| Some(DEFAULT_INFO_TAB.to_string())),
            road: optional(TabIds::env_name(DatasetKind::Road)),
            support: optional(TabIds::env_name(DatasetKind::Support)),
            store: optional(TabIds::env_name(DatasetKind::Store)),
        };
        let info_schema = match optional("INFO_SCHEMA_VERSION") {
            Some(value) => value.parse()?,
            None => SchemaVersion::V2,
        };

        Ok(Self {
            storage,
            geocode_api_key,
            document_id: optional("SHEET_DOCUMENT_ID")
                .unwrap_or_else(|| DEFAULT_DOCUMENT_ID.to_string()),
            tabs,
            info_schema,
            prefecture: optional("GEOCODE_PREFECTURE")
                .unwrap_or_else(|| DEFAULT_PREFECTURE.to_string()),
            overrides_path: optional("GEOCODE_OVERRIDES_PATH").map(PathBuf::from),
        })
    }

    /// Built-in overrides, extended by the optional overrides file.
    pub fn static_overrides(&self) -> Result<StaticOverrides, JobError> {
        let mut overrides = StaticOverrides::builtin();
        if let Some(path) = &self.overrides_path {
            overrides.extend(load_overrides(path)?);
        }
        Ok(overrides)
    }
}

/// Reads `{ "<address fragment>": { "lat": .., "lng": .. } }`.
pub fn load_overrides(path: &Path) -> Result<BTreeMap<String, Coordinate>, JobError> {
    let content =
        fs::read_to_string(path).map_err(|_| JobError::ConfigRead(path.to_path_buf()))?;
    serde_json::from_str(&content).map_err(|err| JobError::ConfigParse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CLOUDFLARE_ACCOUNT_ID", "acct"),
            ("CLOUDFLARE_ACCESS_KEY_ID", "key-id"),
            ("CLOUDFLARE_SECRET_ACCESS_KEY", "secret"),
            ("CLOUDFLARE_R2_BUCKET", "bucket"),
            ("GOOGLE_MAPS_API_KEY", "maps-key"),
        ])
    }

    #[test]
    fn defaults_apply_when_optional_values_absent() {
        let env = base_env();
        let config =
            JobConfig::from_lookup(|name| env.get(name).map(|value| value.to_string())).unwrap();
        assert_eq!(config.document_id, DEFAULT_DOCUMENT_ID);
        assert_eq!(config.tabs.get(DatasetKind::Info), Some("0"));
        assert_eq!(config.tabs.get(DatasetKind::Road), None);
        assert_eq!(config.info_schema, SchemaVersion::V2);
        assert_eq!(config.prefecture, "石川県");
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("CLOUDFLARE_R2_BUCKET", "  ");
        let err = JobConfig::from_lookup(|name| env.get(name).map(|value| value.to_string()))
            .unwrap_err();
        assert!(matches!(err, JobError::MissingConfig(name) if name == "CLOUDFLARE_R2_BUCKET"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let env = base_env();
        let config =
            JobConfig::from_lookup(|name| env.get(name).map(|value| value.to_string())).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("\"secret\""));
        assert!(!rendered.contains("maps-key"));
        assert!(rendered.contains("\"bucket\""));
    }
}
