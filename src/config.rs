//! Configuration file loading and credential lookup.
//!
//! Settings come from a TOML file; command-line flags take precedence over
//! it and built-in defaults fill whatever neither sets. The password is only
//! ever read from the environment.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::assemble::DocumentFormat;
use crate::pipeline::PartialFailurePolicy;
use crate::session::Credentials;

/// Directory name under the user's config home.
pub const CONFIG_DIR_NAME: &str = "chapter-binder";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable holding the login name.
pub const USERNAME_ENV: &str = "CHAPTER_BINDER_USERNAME";

/// Environment variable holding the login password.
pub const PASSWORD_ENV: &str = "CHAPTER_BINDER_PASSWORD";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Carries the parser message only; the offending line may hold a secret.
    #[error("failed to parse config file '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// TOML-backed defaults; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory receiving one folder per content item.
    pub output_dir: Option<PathBuf>,
    /// Concurrent image fetches per chapter.
    pub concurrency: Option<u8>,
    /// Attempts per image before it is given up on.
    pub max_retries: Option<u8>,
    pub policy: Option<PartialFailurePolicy>,
    /// `"pdf"` or `"cbz"`.
    pub format: Option<DocumentFormat>,
    /// Longest page edge in pixels after normalization.
    pub max_edge: Option<u32>,
    /// Density embedded when a page declares none.
    pub default_dpi: Option<u16>,
    pub jpeg_quality: Option<u8>,
    /// Payloads at or below this size are not images.
    pub min_payload_bytes: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub render_timeout_secs: Option<u64>,
    /// Login name; the password is read from the environment only.
    pub username: Option<String>,
}

impl FileConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            line: e
                .span()
                .map_or(1, |span| raw[..span.start.min(raw.len())].matches('\n').count() + 1),
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against the ranges the CLI accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("concurrency", self.concurrency.map(u64::from), 1, 100, "1..=100")?;
        check_range("max_retries", self.max_retries.map(u64::from), 1, 10, "1..=10")?;
        check_range("max_edge", self.max_edge.map(u64::from), 64, 10_000, "64..=10000")?;
        check_range("default_dpi", self.default_dpi.map(u64::from), 1, 2400, "1..=2400")?;
        check_range("jpeg_quality", self.jpeg_quality.map(u64::from), 1, 100, "1..=100")?;
        check_range("min_payload_bytes", self.min_payload_bytes, 0, 1_048_576, "0..=1048576")?;
        check_range("fetch_timeout_secs", self.fetch_timeout_secs, 1, 3600, "1..=3600")?;
        check_range("render_timeout_secs", self.render_timeout_secs, 1, 3600, "1..=3600")?;
        Ok(())
    }
}

fn check_range(
    field: &'static str,
    value: Option<u64>,
    min: u64,
    max: u64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(ConfigError::Invalid {
            field,
            value: v.to_string(),
            expected,
        }),
        _ => Ok(()),
    }
}

/// A loaded config together with where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    /// `None` when no file exists at the resolved path.
    pub config: Option<FileConfig>,
}

/// Default config location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/chapter-binder/config.toml`
/// 2. `$HOME/.config/chapter-binder/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn env_var_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Reads and validates the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::parse(&raw, path)
}

/// Loads `explicit` if given (it must exist), otherwise the default path
/// when a file is present there.
///
/// # Errors
///
/// Returns [`ConfigError`] for an unreadable or invalid file.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(load_file_config(path)?),
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref().filter(|p| p.exists()) else {
        debug!(path = ?path, "no config file");
        return Ok(LoadedConfig { path, config: None });
    };

    let config = load_file_config(path_ref)?;
    debug!(path = %path_ref.display(), "config loaded");
    Ok(LoadedConfig {
        path,
        config: Some(config),
    })
}

/// Credentials from the environment, falling back to the config file for the
/// username. `None` unless both parts are present.
#[must_use]
pub fn credentials_from_env(config_username: Option<&str>) -> Option<Credentials> {
    resolve_credentials(
        env_var_non_empty(USERNAME_ENV),
        env_var_non_empty(PASSWORD_ENV),
        config_username,
    )
}

fn resolve_credentials(
    env_username: Option<String>,
    env_password: Option<String>,
    config_username: Option<&str>,
) -> Option<Credentials> {
    let username = env_username.or_else(|| {
        config_username
            .filter(|u| !u.trim().is_empty())
            .map(str::to_string)
    })?;
    let password = env_password?;
    Some(Credentials::new(username, password))
}
