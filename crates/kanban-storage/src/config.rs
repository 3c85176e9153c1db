use crate::local::LocalStore;
use crate::remote::{RemoteStorage, DEFAULT_API_URL};
use anyhow::{bail, Context, Result};
use kanban_core::BoardStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Local => f.write_str("local"),
            StorageMode::Remote => f.write_str("remote"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "local" => Ok(StorageMode::Local),
            "remote" | "api" => Ok(StorageMode::Remote),
            other => Err(format!("Unknown storage mode: {other}")),
        }
    }
}

/// Client settings shared by the CLI and the terminal board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub mode: StorageMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ClientConfig {
    /// `KANBAN_CONFIG_PATH`, else `<config_dir>/kanban/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = non_empty_env("KANBAN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kanban")
            .join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to encode config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Loads the file and applies `KANBAN_*` environment overrides.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(non_empty_env)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("KANBAN_MODE") {
            self.mode = mode
                .parse()
                .map_err(|err: String| anyhow::anyhow!(err))
                .context("KANBAN_MODE")?;
        }
        if let Some(dir) = lookup("KANBAN_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("KANBAN_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(token) = lookup("KANBAN_TOKEN") {
            self.token = Some(token);
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("kanban"))
            .unwrap_or_else(|| PathBuf::from(".kanban"))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn open_backend(&self) -> Result<Box<dyn BoardStorage>> {
        match self.mode {
            StorageMode::Local => {
                let dir = self.data_dir();
                let store = LocalStore::open(&dir)
                    .with_context(|| format!("Failed to open local store in {}", dir.display()))?;
                Ok(Box::new(store))
            }
            StorageMode::Remote => {
                let Some(token) = self.token.as_deref().filter(|token| !token.is_empty()) else {
                    bail!("Not signed in; run `kanban login --token <token>` first");
                };
                let remote = RemoteStorage::new(self.api_url(), token)
                    .context("Failed to configure API client")?;
                Ok(Box::new(remote))
            }
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
