use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Daemon settings, read from `configs/ondine.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSettings {
    /// Path of the persisted interaction list.
    #[serde(default = "default_interactions_path")]
    pub interactions: PathBuf,
    /// Optional `env_logger`-style filter, e.g. "info,ondine_core=debug".
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            interactions: default_interactions_path(),
            log_filter: None,
        }
    }
}

fn default_interactions_path() -> PathBuf {
    PathBuf::from("configs/interactions.json")
}

/// Matches the daemon behavior: try common relative paths for
/// `configs/ondine.toml`.
pub fn read_settings_text() -> anyhow::Result<String> {
    let paths = ["configs/ondine.toml", "../../configs/ondine.toml"];
    for p in &paths {
        if let Ok(text) = fs::read_to_string(p) {
            return Ok(text);
        }
    }
    anyhow::bail!("Could not load ondine.toml from {:?}", paths);
}

/// Settings file is optional; a missing file falls back to defaults while a
/// present-but-invalid one is still an error.
pub fn load_daemon_settings() -> anyhow::Result<DaemonSettings> {
    match read_settings_text() {
        Ok(text) => {
            let settings: DaemonSettings = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("Failed to parse ondine.toml: {e}"))?;
            Ok(settings)
        }
        Err(_) => Ok(DaemonSettings::default()),
    }
}
