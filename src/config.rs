// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{ChangelogError, Result};

pub const REPO_CONFIG_FILE: &str = ".changelog-synth.toml";

const ENV_MODEL: &str = "CHANGELOG_SYNTH_MODEL";
const ENV_BASE_URL: &str = "CHANGELOG_SYNTH_BASE_URL";

/// Characters that would change the meaning of a double-quoted `sh` word.
const SHELL_UNSAFE: &[char] = &['"', '$', '`', '\n', '\r'];

/// Immutable settings threaded through every stage of a run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub base_url: String,
    pub changelog_file: PathBuf,
    pub max_diff_chars: usize,
    pub request_timeout_secs: u64,
    pub hook_marker: String,
    pub entry_point: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // small and fast enough for CPU-only CI runners
            model: "phi3:mini".into(),
            base_url: "http://localhost:11434".into(),
            changelog_file: PathBuf::from("CHANGELOG.md"),
            max_diff_chars: 2000,
            request_timeout_secs: 300,
            hook_marker: "changelog-synth post-merge hook".into(),
            entry_point: PathBuf::from("changelog-synth"),
        }
    }
}

/// Values supplied on the command line; they win over every other source.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub model: Option<String>,
    pub changelog_file: Option<PathBuf>,
}

impl Config {
    /// Resolve defaults, then the first config file found, then
    /// environment, then CLI overrides.
    pub fn load(repo_root: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut cfg = match config_file(repo_root, overrides) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(model) = std::env::var(ENV_MODEL) {
            if !model.trim().is_empty() {
                cfg.model = model.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                cfg.base_url = url.trim().to_string();
            }
        }

        if let Some(model) = &overrides.model {
            cfg.model = model.clone();
        }
        if let Some(file) = &overrides.changelog_file {
            cfg.changelog_file = file.clone();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ChangelogError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
            .map_err(|e| ChangelogError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ChangelogError::Config("model cannot be empty".into()));
        }
        if self.max_diff_chars == 0 {
            return Err(ChangelogError::Config(
                "max_diff_chars must be greater than zero".into(),
            ));
        }
        if self.hook_marker.trim().is_empty() {
            return Err(ChangelogError::Config("hook_marker cannot be empty".into()));
        }
        if self.hook_marker.contains(['\n', '\r']) {
            return Err(ChangelogError::Config(
                "hook_marker must be a single line".into(),
            ));
        }
        let entry = self.entry_point.to_string_lossy();
        if entry.trim().is_empty() || entry.contains(SHELL_UNSAFE) {
            return Err(ChangelogError::Config(format!(
                "entry_point {:?} cannot be embedded in the hook script",
                entry
            )));
        }
        self.base()?;
        Ok(())
    }

    pub fn generate_url(&self) -> Result<Url> {
        self.endpoint("api/generate")
    }

    pub fn tags_url(&self) -> Result<Url> {
        self.endpoint("api/tags")
    }

    pub fn pull_url(&self) -> Result<Url> {
        self.endpoint("api/pull")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn base(&self) -> Result<Url> {
        // Url::join drops the last path segment unless it ends with '/'
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
            .map_err(|e| ChangelogError::Config(format!("base_url '{}': {}", self.base_url, e)))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base()?
            .join(path)
            .map_err(|e| ChangelogError::Config(format!("endpoint {}: {}", path, e)))
    }
}

fn config_file(repo_root: Option<&Path>, overrides: &Overrides) -> Option<PathBuf> {
    if let Some(path) = &overrides.config_file {
        return Some(path.clone());
    }

    if let Some(root) = repo_root {
        let local = root.join(REPO_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
    }

    let mut global = dirs::config_dir()?;
    global.push("changelog-synth");
    global.push("config.toml");
    global.is_file().then_some(global)
}
