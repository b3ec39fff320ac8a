use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Preferences remembered between `querydesk` invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliSettings {
    #[serde(default)]
    pub default_datasource: Option<String>,
    #[serde(default = "CliSettings::default_stream_answers")]
    pub stream_answers: bool,
    #[serde(default)]
    pub last_conversation: Option<String>,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            default_datasource: None,
            stream_answers: CliSettings::default_stream_answers(),
            last_conversation: None,
        }
    }
}

impl CliSettings {
    fn default_stream_answers() -> bool {
        true
    }
}

pub async fn load_cli_settings(dir: &Path) -> Result<CliSettings> {
    let path = cli_settings_path(dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                let defaults = CliSettings::default();
                save_cli_settings(dir, &defaults).await?;
                warn!(
                    error = ?err,
                    "failed to parse cli_settings.json, resetting to defaults"
                );
                Ok(defaults)
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CliSettings::default()),
        Err(err) => Err(err).context("failed to read cli_settings.json"),
    }
}

pub async fn save_cli_settings(dir: &Path, settings: &CliSettings) -> Result<()> {
    let path = cli_settings_path(dir);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(&path, serialized)
        .await
        .with_context(|| format!("failed to write cli_settings.json at {}", path.display()))
}

fn cli_settings_path(dir: &Path) -> PathBuf {
    dir.join("cli_settings.json")
}

/// Directory for CLI preferences.
pub fn config_dir() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        base.config_dir().join("querydesk")
    } else {
        PathBuf::from(".querydesk")
    }
}
