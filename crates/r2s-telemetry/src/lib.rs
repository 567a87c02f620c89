use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log level: {0}")]
    InvalidLevel(String),
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "r2s_gateway" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of compact human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from a level name such as `"debug"`.
    pub fn from_level_name(level: &str, json: bool) -> Result<Self, TelemetryError> {
        let log_level =
            Level::from_str(level.trim()).map_err(|_| TelemetryError::InvalidLevel(level.to_string()))?;
        Ok(Self {
            log_level,
            module_levels: Vec::new(),
            json,
        })
    }

    pub fn with_module_level(mut self, module: impl Into<String>, level: Level) -> Self {
        self.module_levels.push((module.into(), level));
        self
    }

    /// Like [`with_module_level`](Self::with_module_level) with a level name from settings.
    pub fn with_module_level_name(self, module: &str, level: &str) -> Result<Self, TelemetryError> {
        let parsed = Level::from_str(level.trim()).map_err(|_| TelemetryError::InvalidLevel(level.to_string()))?;
        Ok(self.with_module_level(module.trim(), parsed))
    }

    /// `EnvFilter` directive string for this config.
    pub fn filter_directive(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Returned by [`init_telemetry`]; describes the installed filter.
#[derive(Debug)]
pub struct TelemetryGuard {
    directive: String,
    json: bool,
}

impl TelemetryGuard {
    /// The filter actually in effect (`RUST_LOG` wins over config).
    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn json(&self) -> bool {
        self.json
    }
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let (env_filter, directive) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let directive = filter.to_string();
            (filter, directive)
        }
        Err(_) => {
            let directive = config.filter_directive();
            (EnvFilter::new(&directive), directive)
        }
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let compact_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().compact().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(TelemetryGuard {
        directive,
        json: config.json,
    })
}
