use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_SESSION_TTL_MINUTES: i64 = 480;

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Log level filter string, e.g. "debug", "info,deskd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// How long an issued session token stays valid, in minutes (default: 480).
    session_ttl_minutes: Option<i64>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub data_dir: PathBuf,
    pub log: String,
    /// "pretty" | "json" (DESKD_LOG_FORMAT env var).
    pub log_format: String,
    pub session_ttl_minutes: i64,
}

impl DeskConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(data_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());
        let log_format = std::env::var("DESKD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());
        let session_ttl_minutes = toml
            .session_ttl_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_MINUTES);

        Self {
            data_dir,
            log,
            log_format,
            session_ttl_minutes,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/deskd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("deskd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/deskd or ~/.local/share/deskd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("deskd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("deskd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\deskd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("deskd");
        }
    }
    // Fallback
    PathBuf::from(".deskd")
}
