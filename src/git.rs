// src/git.rs

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{debug, warn};

use crate::entry::{format_timestamp, CommitMetadata};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    fn trimmed(&self) -> Option<&str> {
        let s = self.stdout.trim();
        (self.success && !s.is_empty()).then_some(s)
    }
}

/// Seam over the `git` executable so diff selection can be exercised
/// without a repository.
pub trait Vcs {
    fn run(&self, args: &[&str]) -> io::Result<GitOutput>;
}

/// Shells out to `git` in a fixed working directory.
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Vcs for Git {
    fn run(&self, args: &[&str]) -> io::Result<GitOutput> {
        debug!(args = %args.join(" "), "git");

        let out = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()?;

        Ok(GitOutput {
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        })
    }
}

/// Stdout of a git command, or empty when the command could not run.
pub fn stdout_or_empty(vcs: &dyn Vcs, args: &[&str]) -> String {
    match vcs.run(args) {
        Ok(out) => out.stdout,
        Err(e) => {
            warn!(error = %e, args = %args.join(" "), "git invocation failed");
            String::new()
        }
    }
}

pub fn succeeds(vcs: &dyn Vcs, args: &[&str]) -> bool {
    vcs.run(args)
        .map(|o| o.success && !o.stdout.trim().is_empty())
        .unwrap_or(false)
}

/* ============================================================
   Repository layout
   ============================================================ */

pub fn repo_root(vcs: &dyn Vcs) -> Option<PathBuf> {
    let out = vcs.run(&["rev-parse", "--show-toplevel"]).ok()?;
    out.trimmed().map(PathBuf::from)
}

/// Hook directory, honouring worktrees and `core.hooksPath`.
pub fn hooks_dir(vcs: &dyn Vcs, repo_root: &Path) -> PathBuf {
    let resolved = vcs
        .run(&["rev-parse", "--git-path", "hooks"])
        .ok()
        .and_then(|o| o.trimmed().map(PathBuf::from));

    match resolved {
        Some(p) if p.is_absolute() => p,
        Some(p) => repo_root.join(p),
        None => repo_root.join(".git").join("hooks"),
    }
}

/* ============================================================
   Commit metadata
   ============================================================ */

pub fn commit_metadata(vcs: &dyn Vcs) -> CommitMetadata {
    CommitMetadata {
        timestamp_display: format_timestamp(&commit_time(vcs)),
        files_changed: files_changed(vcs),
        author: commit_author(vcs),
    }
}

/// Wall-clock time of HEAD in its own offset, or now.
fn commit_time(vcs: &dyn Vcs) -> NaiveDateTime {
    let raw = vcs.run(&["show", "-s", "--format=%ci", "HEAD"]).ok();

    if let Some(s) = raw.as_ref().and_then(|o| o.trimmed()) {
        match DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
            Ok(dt) => return dt.naive_local(),
            Err(e) => warn!(raw = s, error = %e, "could not parse commit timestamp"),
        }
    } else {
        warn!("could not read commit timestamp, using current time");
    }

    Local::now().naive_local()
}

fn files_changed(vcs: &dyn Vcs) -> usize {
    // merge commits compare against the first parent
    if let Ok(out) = vcs.run(&["diff", "--name-only", "HEAD^1", "HEAD"]) {
        if out.success {
            return count_lines(&out.stdout);
        }
    }

    match vcs.run(&["diff-tree", "--no-commit-id", "--name-only", "-r", "HEAD"]) {
        Ok(out) if out.success => count_lines(&out.stdout),
        _ => {
            warn!("could not count changed files");
            0
        }
    }
}

fn commit_author(vcs: &dyn Vcs) -> String {
    vcs.run(&["show", "-s", "--format=%an", "HEAD"])
        .ok()
        .and_then(|o| o.trimmed().map(str::to_string))
        .unwrap_or_else(|| {
            warn!("could not read commit author");
            "Unknown".to_string()
        })
}

fn count_lines(s: &str) -> usize {
    s.lines().filter(|l| !l.trim().is_empty()).count()
}
