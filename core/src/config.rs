use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const API_URL_ENV: &str = "NEXT_PUBLIC_API_URL";
pub const STATE_DIR_ENV: &str = "QUERYDESK_STATE_DIR";
pub const DEFAULT_API_URL: &str = "http://localhost:8765";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Resolved settings for talking to the API gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
    /// Directory holding the persisted session.
    pub state_dir: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid gateway URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("invalid querydesk.yaml: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidUrl { url, .. } => {
                format!("The gateway URL `{url}` is not valid. Check {API_URL_ENV} or querydesk.yaml.")
            }
            Self::Unreadable { path, .. } => {
                format!("Could not read {}. Check file permissions.", path.display())
            }
            Self::Invalid(detail) => format!("querydesk.yaml is invalid: {detail}."),
        }
    }
}

/// Values that override the file and environment layers, typically CLI flags.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub api_url: Option<String>,
    pub state_dir: Option<PathBuf>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            state_dir: default_state_dir(),
        }
    }
}

impl GatewaySettings {
    /// Resolve settings from `querydesk.yaml`, `.env`, the process environment
    /// and `overrides`, in increasing order of precedence.
    pub fn load(overrides: SettingsOverrides) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match locate_config_file() {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let env = EnvLayer {
            api_url: std::env::var(API_URL_ENV).ok(),
            state_dir: std::env::var_os(STATE_DIR_ENV).map(PathBuf::from),
        };
        resolve(file, env, overrides)
    }

    /// Settings pointing at `base_url`, with every other value defaulted.
    pub fn for_base_url(base_url: &str, state_dir: PathBuf) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            state_dir,
        })
    }
}

struct EnvLayer {
    api_url: Option<String>,
    state_dir: Option<PathBuf>,
}

fn resolve(
    file: Option<RawConfig>,
    env: EnvLayer,
    overrides: SettingsOverrides,
) -> Result<GatewaySettings, ConfigError> {
    let mut settings = GatewaySettings::default();
    let gateway = file.and_then(|raw| raw.gateway).unwrap_or_default();

    let mut base_url = gateway.api_url;
    if let Some(url) = env.api_url.filter(|url| !url.trim().is_empty()) {
        base_url = Some(url);
    }
    if let Some(url) = overrides.api_url {
        base_url = Some(url);
    }
    if let Some(url) = base_url {
        settings.base_url = normalize_base_url(&url)?;
    }

    if let Some(secs) = gateway.timeout_secs {
        if secs == 0 {
            return Err(ConfigError::Invalid(
                "`gateway.timeout_secs` must be greater than zero".to_string(),
            ));
        }
        settings.timeout = Duration::from_secs(secs);
    }

    if let Some(dir) = overrides
        .state_dir
        .or(env.state_dir)
        .or(gateway.state_dir)
    {
        settings.state_dir = dir;
    }

    Ok(settings)
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|err| ConfigError::InvalidUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme `{}`", parsed.scheme()),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn read_config_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    serde_yaml::from_str(&contents).map_err(|err| ConfigError::Invalid(err.to_string()))
}

fn locate_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|path| path.exists())
}

fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("querydesk");
        paths.push(config_dir.join("querydesk.yaml"));
        paths.push(config_dir.join("querydesk.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".querydesk").join("querydesk.yaml"));
        paths.push(home_dir.join(".querydesk").join("querydesk.yml"));
    } else {
        paths.push(PathBuf::from("querydesk.yaml"));
        paths.push(PathBuf::from("querydesk.yml"));
    }
    paths
}

fn default_state_dir() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        base.data_local_dir().join("querydesk")
    } else {
        PathBuf::from(".querydesk")
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    gateway: Option<GatewaySection>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewaySection {
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    state_dir: Option<PathBuf>,
}
