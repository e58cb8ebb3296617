// src/diff.rs

//! Selects which changes to summarize for the current invocation context.

use tracing::{info, warn};

use crate::git::{self, Vcs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Uncommitted work: staged then unstaged.
    Manual,
    /// The merge commit a CI job was triggered for.
    ContinuousIntegration,
    /// Invoked from the `post-merge` hook.
    PostMerge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffContext {
    pub mode: DiffMode,
    pub raw_text: String,
    pub truncated: bool,
}

/// Diff for `mode`, bounded to `max_chars`. `None` means there is nothing
/// to report; git failures are treated the same way.
pub fn resolve(vcs: &dyn Vcs, mode: DiffMode, max_chars: usize) -> Option<DiffContext> {
    let diff = match mode {
        DiffMode::Manual => {
            let staged = git::stdout_or_empty(vcs, &["diff", "--cached"]);
            let unstaged = git::stdout_or_empty(vcs, &["diff"]);
            staged + &unstaged
        }

        DiffMode::ContinuousIntegration => {
            let merged = first_parent_diff(vcs);
            if merged.trim().is_empty() {
                git::stdout_or_empty(vcs, &["show", "--format=", "--no-color", "HEAD"])
            } else {
                merged
            }
        }

        DiffMode::PostMerge => {
            // fast-forward merges leave HEAD^1 unrelated to what was pulled in
            if git::succeeds(vcs, &["rev-parse", "--verify", "ORIG_HEAD"]) {
                git::stdout_or_empty(vcs, &["diff", "ORIG_HEAD", "HEAD", "--no-color"])
            } else {
                first_parent_diff(vcs)
            }
        }
    };

    let diff = diff.trim();
    if diff.is_empty() {
        return None;
    }

    let original = diff.chars().count();
    let raw_text = truncate(diff, max_chars);
    let truncated = raw_text != diff;
    if truncated {
        warn!(
            from = original,
            to = raw_text.chars().count(),
            "diff truncated"
        );
    }
    info!(?mode, chars = original, "found changes");

    Some(DiffContext {
        mode,
        raw_text,
        truncated,
    })
}

fn first_parent_diff(vcs: &dyn Vcs) -> String {
    git::stdout_or_empty(vcs, &["diff", "HEAD^1", "HEAD", "--no-color"])
}

/// Keeps the first 60% and last 20% of the budget around an elision marker.
pub fn truncate(diff: &str, max_chars: usize) -> String {
    let total = diff.chars().count();
    if total <= max_chars {
        return diff.to_string();
    }

    let head_len = max_chars * 6 / 10;
    let tail_len = max_chars * 2 / 10;

    let head: String = diff.chars().take(head_len).collect();
    let tail: String = diff.chars().skip(total - tail_len).collect();

    format!(
        "{}\n\n{}\n\n{}",
        head,
        elision_marker(total - max_chars),
        tail
    )
}

pub fn elision_marker(omitted: usize) -> String {
    format!("... [diff truncated: {} characters omitted] ...", omitted)
}
