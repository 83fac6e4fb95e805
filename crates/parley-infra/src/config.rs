//! Configuration loader for Parley.
//!
//! Reads `config.toml` and deserializes it into [`ParleyConfig`]. Falls back
//! to defaults when the file is missing or malformed, then applies
//! `PARLEY_*` environment overrides on top.

use std::path::{Path, PathBuf};

use parley_types::config::ParleyConfig;
use parley_types::error::ConfigError;

/// Directory holding `config.toml`, overriding the platform default.
pub const CONFIG_DIR_ENV: &str = "PARLEY_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Resolve which config file to read.
///
/// Priority:
/// 1. `explicit` (the `--config` flag)
/// 2. `$PARLEY_CONFIG_DIR/config.toml`
/// 3. `{platform config dir}/parley/config.toml`
pub fn resolve_config_path(explicit: Option<&Path>, config_dir_env: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(dir) = config_dir_env.filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE));
    }
    dirs::config_dir().map(|dir| dir.join("parley").join(CONFIG_FILE))
}

/// Load configuration for this process.
///
/// An explicitly named file must exist; an implicit one may be absent.
/// Environment overrides are applied last.
pub async fn load_config(explicit: Option<&Path>) -> Result<ParleyConfig, ConfigError> {
    let path = resolve_config_path(explicit, std::env::var(CONFIG_DIR_ENV).ok());
    let mut config = match path {
        Some(path) => load_config_file(&path, explicit.is_some()).await?,
        None => ParleyConfig::default(),
    };
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    Ok(config)
}

/// Load `path` into a [`ParleyConfig`].
///
/// - If the file does not exist: [`ConfigError::NotFound`] when `required`,
///   otherwise [`ParleyConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config_file(path: &Path, required: bool) -> Result<ParleyConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if required {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return Ok(ParleyConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    match toml::from_str::<ParleyConfig>(&content) {
        Ok(config) => {
            tracing::debug!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            Ok(ParleyConfig::default())
        }
    }
}

/// Apply `PARLEY_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut ParleyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PARLEY_BRIDGE_PORT") {
        config.bridge.port = parse_port("PARLEY_BRIDGE_PORT", &port)?;
    }
    if let Some(port) = lookup("PARLEY_CHAT_PORT") {
        config.chat.port = parse_port("PARLEY_CHAT_PORT", &port)?;
    }
    if let Some(url) = lookup("PARLEY_DIRECTORY_URL") {
        config.directory.base_url = url;
    }
    if let Some(url) = lookup("PARLEY_BRIDGE_URL") {
        config.chat.bridge_url = url;
    }
    if let Some(model) = lookup("PARLEY_MODEL") {
        config.chat.model = model;
    }
    Ok(())
}

fn parse_port(var: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}
