use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::materializer::EvalLimits;

/// Where the materializer reads component source from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// In-process catalog lookups.
    Store,
    /// A catalog service reached over HTTP.
    Http,
    /// Prototype files on disk.
    Fs,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(SourceKind::Store),
            "http" => Ok(SourceKind::Http),
            "fs" => Ok(SourceKind::Fs),
            other => Err(format!("unknown component source `{}`", other)),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields default to values suitable for local development.
#[derive(Debug, Clone)]
pub struct ShowcaseConfig {
    pub host: String,
    pub port: u16,
    /// JSON document backing the record store.
    pub data_file: PathBuf,
    /// Root of `<projectType>/<Component>.jsx` prototype files.
    pub prototypes_dir: PathBuf,
    /// Directory of project manifests feeding the namespace resolver.
    pub manifest_dir: PathBuf,
    pub body_limit_bytes: usize,
    pub component_source: SourceKind,
    pub catalog_url: String,
    pub limits: EvalLimits,
}

impl Default for ShowcaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            data_file: PathBuf::from("data.json"),
            prototypes_dir: PathBuf::from("prototypes"),
            manifest_dir: PathBuf::from("manifests"),
            body_limit_bytes: 50 * 1024 * 1024,
            component_source: SourceKind::Store,
            catalog_url: "http://localhost:3001".to_string(),
            limits: EvalLimits::default(),
        }
    }
}

/// Parse `name` if set; unparsable values are logged and replaced by `default`.
fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

impl ShowcaseConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                 |
    /// |--------------------|-------------------------|
    /// | `HOST`             | `127.0.0.1`             |
    /// | `PORT`             | `3001`                  |
    /// | `DATA_FILE`        | `data.json`             |
    /// | `PROTOTYPES_DIR`   | `prototypes`            |
    /// | `MANIFEST_DIR`     | `manifests`             |
    /// | `BODY_LIMIT_MB`    | `50`                    |
    /// | `COMPONENT_SOURCE` | `store`                 |
    /// | `CATALOG_URL`      | `http://localhost:3001` |
    /// | `EVAL_TIMEOUT_MS`  | `2000`                  |
    /// | `EVAL_FUEL`        | `100000`                |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let body_limit_mb: usize = parsed_var("BODY_LIMIT_MB", 50);
        let timeout_ms: u64 = parsed_var(
            "EVAL_TIMEOUT_MS",
            defaults.limits.timeout.as_millis() as u64,
        );

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed_var("PORT", defaults.port),
            data_file: std::env::var("DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file),
            prototypes_dir: std::env::var("PROTOTYPES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.prototypes_dir),
            manifest_dir: std::env::var("MANIFEST_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.manifest_dir),
            body_limit_bytes: body_limit_mb.saturating_mul(1024 * 1024),
            component_source: parsed_var("COMPONENT_SOURCE", defaults.component_source),
            catalog_url: std::env::var("CATALOG_URL").unwrap_or(defaults.catalog_url),
            limits: EvalLimits {
                fuel: parsed_var("EVAL_FUEL", defaults.limits.fuel),
                timeout: Duration::from_millis(timeout_ms),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
