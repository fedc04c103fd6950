//! Configuration file parser for ~/.config/kbase/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged as warnings, since they are
//! usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `root_initial_password`.
pub const ROOT_PASSWORD_ENV: &str = "ROOT_INITIAL_PASSWORD";

/// Administrator account seeded by `kbase --init` when none is configured.
pub const DEFAULT_ROOT_EMAIL: &str = "root@kbase.local";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The custom Debug impl masks `root_initial_password`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. Defaults to `kbase.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Email of the root administrator account.
    pub root_email: String,

    /// Initial root password, used only when the root account is created.
    /// The `ROOT_INITIAL_PASSWORD` env var takes precedence.
    pub root_initial_password: Option<String>,

    /// Period of the recently-viewed expiry sweep in minutes. 0 disables it.
    pub retention_sweep_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            root_email: DEFAULT_ROOT_EMAIL.to_string(),
            root_initial_password: None,
            retention_sweep_minutes: 60,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("root_email", &self.root_email)
            .field(
                "root_initial_password",
                &self.root_initial_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("retention_sweep_minutes", &self.retention_sweep_minutes)
            .finish()
    }
}

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "root_email",
    "root_initial_password",
    "retention_sweep_minutes",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), root_email = %config.root_email, "Loaded configuration");
        Ok(config)
    }

    /// Database file, relative paths resolved against `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join("kbase.db"),
        }
    }

    /// Initial root password from the environment or the config file.
    ///
    /// `None` when neither provides a non-empty value.
    pub fn root_initial_password(&self) -> Option<SecretString> {
        pick_root_password(
            std::env::var(ROOT_PASSWORD_ENV).ok(),
            self.root_initial_password.as_deref(),
        )
    }
}

fn pick_root_password(from_env: Option<String>, configured: Option<&str>) -> Option<SecretString> {
    from_env
        .filter(|p| !p.is_empty())
        .or_else(|| configured.filter(|p| !p.is_empty()).map(str::to_string))
        .map(SecretString::from)
}

// ============================================================================
// Tests
// ============================================================================
