//! Settings types. Every struct defaults field-by-field so a partial settings
//! file only needs the keys it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings for the r2s service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct R2sSettings {
    pub server: ServerSettings,
    pub collaborators: CollaboratorSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Largest accepted request body. Solve uploads carry several CSV files.
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            body_limit_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Endpoints of the external collaborators. An endpoint left unset makes
/// every call to that collaborator fail.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollaboratorSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocess_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocess_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_url: Option<String>,
    /// Per-request timeout. Allocation runs can take several minutes.
    pub timeout_secs: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            preprocess_url: None,
            allocation_url: None,
            postprocess_url: None,
            validation_url: None,
            timeout_secs: 900,
        }
    }
}

/// Snapshot store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// SQLite database file. Unset disables snapshot persistence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    pub pool_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            pool_size: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` level. `RUST_LOG` still takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"tower_http": "warn"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = R2sSettings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 8000);
        assert!(s.server.cors_origins.is_empty());
        assert_eq!(s.collaborators.timeout_secs, 900);
        assert!(s.collaborators.allocation_url.is_none());
        assert!(s.store.database_path.is_none());
        assert_eq!(s.store.pool_size, 4);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn serializes_camel_case_and_skips_unset_urls() {
        let json = serde_json::to_value(R2sSettings::default()).unwrap();
        assert_eq!(json["server"]["bodyLimitBytes"], 25 * 1024 * 1024);
        assert_eq!(json["collaborators"]["timeoutSecs"], 900);
        assert!(json["collaborators"].get("allocationUrl").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: R2sSettings =
            serde_json::from_str(r#"{"store": {"databasePath": "/tmp/r2s.db"}}"#).unwrap();
        assert_eq!(s.store.database_path.as_deref(), Some("/tmp/r2s.db"));
        assert_eq!(s.store.pool_size, 4);
        assert_eq!(s.server.port, 8000);
    }

    #[test]
    fn logging_module_overrides() {
        let s: R2sSettings =
            serde_json::from_str(r#"{"logging": {"level": "debug", "modules": {"tower_http": "warn"}}}"#).unwrap();
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.logging.modules.get("tower_http").map(String::as_str), Some("warn"));
        assert!(!s.logging.json);
    }
}
