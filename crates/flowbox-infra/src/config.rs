//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.flowbox/` in production)
//! or an explicit path, and deserializes it into [`EngineConfig`]. Falls back
//! to defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use flowbox_types::config::EngineConfig;

/// Shortest allowed box timeout, in seconds.
const MIN_STEP_TIMEOUT_SECS: u64 = 1;

/// Resolve the flowbox data directory.
///
/// Uses `FLOWBOX_HOME` when set, otherwise `~/.flowbox`, otherwise
/// `.flowbox` in the current directory.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLOWBOX_HOME") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".flowbox");
    }

    PathBuf::from(".flowbox")
}

/// `{data_dir}/config.toml`
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Load engine configuration from `path`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or unparseable file: logs a warning and returns the default.
/// - Otherwise returns the parsed config with the timeout floor applied.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => apply_floors(config),
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

fn apply_floors(mut config: EngineConfig) -> EngineConfig {
    if config.step_timeout_secs < MIN_STEP_TIMEOUT_SECS {
        tracing::warn!(
            configured = config.step_timeout_secs,
            "step_timeout_secs below minimum, raising to {MIN_STEP_TIMEOUT_SECS}"
        );
        config.step_timeout_secs = MIN_STEP_TIMEOUT_SECS;
    }
    config
}
