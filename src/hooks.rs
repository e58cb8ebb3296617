// src/hooks.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ChangelogError, Result};

pub const HOOK_NAME: &str = "post-merge";

/// Environment marker exported by the hook so a run knows it was triggered
/// by a merge.
pub const HOOK_ENV: &str = "GIT_HOOK";

const HOOK_TEMPLATE: &str = r#"#!/bin/sh
# {marker}
# Adds a CHANGELOG.md entry after every merge.
# Remove with: changelog-synth --uninstall
export GIT_HOOK="post-merge"

REPO_ROOT=$(git rev-parse --show-toplevel)
ENTRY="$REPO_ROOT/{entry}"

if [ ! -e "$ENTRY" ]; then
    echo "[changelog-synth] {entry} not found at $REPO_ROOT" >&2
    exit 1
fi

cd "$REPO_ROOT" || exit 1

if [ -f "$ENTRY" ] && [ -x "$ENTRY" ]; then
    "$ENTRY" --auto
elif command -v changelog-synth >/dev/null 2>&1; then
    changelog-synth --auto
elif command -v cargo >/dev/null 2>&1; then
    cargo run --quiet --bin changelog-synth -- --auto
else
    echo "[changelog-synth] could not find a way to launch changelog-synth" >&2
    exit 1
fi
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInstallation {
    pub script_path: PathBuf,
    pub marker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Absent,
    Ours,
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed,
    NotInstalled,
}

pub struct HookManager {
    repo_root: PathBuf,
    entry_point: PathBuf,
    installation: HookInstallation,
}

impl HookManager {
    pub fn new(repo_root: impl Into<PathBuf>, hooks_dir: &Path, cfg: &Config) -> Self {
        Self {
            repo_root: repo_root.into(),
            entry_point: cfg.entry_point.clone(),
            installation: HookInstallation {
                script_path: hooks_dir.join(HOOK_NAME),
                marker: cfg.hook_marker.clone(),
            },
        }
    }

    pub fn installation(&self) -> &HookInstallation {
        &self.installation
    }

    pub fn state(&self) -> Result<HookState> {
        let path = &self.installation.script_path;
        match fs::read(path) {
            Ok(bytes) => {
                let body = String::from_utf8_lossy(&bytes);
                if body.contains(&self.installation.marker) {
                    Ok(HookState::Ours)
                } else {
                    Ok(HookState::Foreign)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HookState::Absent),
            Err(e) => Err(ChangelogError::HookPrecondition(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn install(&self) -> Result<InstallOutcome> {
        let entry = self.repo_root.join(&self.entry_point);
        if !entry.exists() {
            return Err(ChangelogError::HookPrecondition(format!(
                "{} not found; place the changelog-synth entry point at the repository root ({}) \
                 or set `entry_point` in {}",
                entry.display(),
                self.repo_root.display(),
                crate::config::REPO_CONFIG_FILE
            )));
        }

        let path = &self.installation.script_path;
        match self.state()? {
            HookState::Ours => {
                info!(path = %path.display(), "changelog hook already installed");
                return Ok(InstallOutcome::AlreadyInstalled);
            }
            HookState::Foreign => {
                warn!(path = %path.display(), "a different post-merge hook exists; not overwriting");
                return Err(ChangelogError::HookPrecondition(format!(
                    "{} already exists and was not installed by changelog-synth; \
                     back it up or remove it first",
                    path.display()
                )));
            }
            HookState::Absent => {}
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| hook_io(path, e))?;
        }
        fs::write(path, self.script()).map_err(|e| hook_io(path, e))?;
        make_executable(path)?;

        info!(path = %path.display(), "hook installed");
        Ok(InstallOutcome::Installed)
    }

    pub fn uninstall(&self) -> Result<UninstallOutcome> {
        let path = &self.installation.script_path;
        match self.state()? {
            HookState::Absent => {
                info!("no hook installed, nothing to remove");
                Ok(UninstallOutcome::NotInstalled)
            }
            HookState::Foreign => Err(ChangelogError::UnrecognizedHook(path.clone())),
            HookState::Ours => {
                fs::remove_file(path).map_err(|e| hook_io(path, e))?;
                info!(path = %path.display(), "hook removed");
                Ok(UninstallOutcome::Removed)
            }
        }
    }

    pub fn script(&self) -> String {
        let entry = self.entry_point.to_string_lossy().replace('\\', "/");
        expand_template(
            HOOK_TEMPLATE,
            &[
                ("marker", self.installation.marker.as_str()),
                ("entry", entry.as_str()),
            ],
        )
    }
}

fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        out = out.replace(&format!("{{{k}}}"), v);
    }
    out
}

fn hook_io(path: &Path, e: io::Error) -> ChangelogError {
    ChangelogError::HookPrecondition(format!("{}: {}", path.display(), e))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path).map_err(|e| hook_io(path, e))?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).map_err(|e| hook_io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
