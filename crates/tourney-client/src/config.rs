// Configuration loading and parsing (client.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tourney_core::status::LoginIdentity;

const CONFIG_FILE: &str = "client.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub login: LoginConfig,
    pub feed: FeedConfig,
    pub logging: LoggingConfig,
}

/// The account whose competitor status is tracked.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub dir: String,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "tourney_client=info,tourney_core=info,warn".to_string()
}

impl Config {
    pub fn login_identity(&self) -> LoginIdentity {
        LoginIdentity::new(&self.login.user_id, &self.login.username)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/client.toml` relative to `base_dir`.
///
/// Does not seed defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

/// Seed `config/` with every file from `defaults/` that is not already
/// there. Returns the paths written; files a user has edited are left alone.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(copy_error(format!(
            "no defaults/ or config/ directory under {}",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_error(format!("cannot create {}: {e}", config_dir.display())))?;
    let entries = std::fs::read_dir(&defaults_dir)
        .map_err(|e| copy_error(format!("cannot list {}: {e}", defaults_dir.display())))?;

    let mut copied = Vec::new();
    for entry in entries {
        let source = entry
            .map_err(|e| copy_error(format!("cannot list {}: {e}", defaults_dir.display())))?
            .path();
        let Some(file_name) = source.file_name().filter(|_| source.is_file()) else {
            continue;
        };
        let target = config_dir.join(file_name);
        if copy_default(&source, &target)? {
            copied.push(target);
        }
    }
    copied.sort();
    Ok(copied)
}

/// Copy one default file unless `target` already exists. The source is read
/// before the target is created, and a failed write removes the partial
/// target, so a later run copies it again.
fn copy_default(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    use std::io::Write;

    if target.exists() {
        return Ok(false);
    }
    let content = std::fs::read(source)
        .map_err(|e| copy_error(format!("cannot read {}: {e}", source.display())))?;

    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(copy_error(format!("cannot create {}: {e}", target.display()))),
    };
    if let Err(e) = dest.write_all(&content) {
        drop(dest);
        let _ = std::fs::remove_file(target);
        return Err(copy_error(format!("cannot write {}: {e}", target.display())));
    }
    Ok(true)
}

fn copy_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Loads config relative to the current working directory after seeding
/// any missing defaults. Also returns the files that were seeded so the
/// caller can report them once logging is up.
pub fn load_config() -> Result<(Config, Vec<PathBuf>), ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    let copied = ensure_config_files(&cwd)?;
    Ok((load_config_from(&cwd)?, copied))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let required: &[(&str, &str)] = &[
        ("login.user_id", config.login.user_id.as_str()),
        ("login.username", config.login.username.as_str()),
        ("logging.dir", config.logging.dir.as_str()),
    ];
    for (name, val) in required {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    // The composite roster id is split on the first ':'.
    if config.login.user_id.contains(':') {
        return Err(ConfigError::ValidationError {
            field: "login.user_id".into(),
            message: "must not contain ':'".into(),
        });
    }

    if config.feed.channel_capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: "feed.channel_capacity".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
