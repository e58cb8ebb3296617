// src/changelog.rs

//! Merges one rendered entry into `CHANGELOG.md`.
//!
//! Responsibilities:
//! - Classify the existing document into a [`ParsedDocument`] shape
//! - Compute the complete new text in memory
//! - Replace the file in a single rename, refusing if it changed on disk
//!
//! Non-responsibilities:
//! - Deciding what the entry says (see `entry.rs`)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::entry::Entry;
use crate::error::{ChangelogError, Result};

pub const DEFAULT_TITLE: &str = "# Changelog";
pub const UNRELEASED_HEADING: &str = "## Unreleased";

/* ============================================================
   Document shape
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDocument<'a> {
    Empty,
    /// `before` ends right before the heading line; `after` is trimmed.
    HasUnreleased {
        before: &'a str,
        heading: &'a str,
        after: &'a str,
    },
    HasTitleOnly {
        title: &'a str,
        body: &'a str,
    },
    HeaderlessBody(&'a str),
}

pub fn parse(text: &str) -> ParsedDocument<'_> {
    let doc = text.trim();
    if doc.is_empty() {
        return ParsedDocument::Empty;
    }

    let mut offset = 0;
    for line in doc.split_inclusive('\n') {
        let heading = line.trim();
        if is_unreleased_heading(heading) {
            return ParsedDocument::HasUnreleased {
                before: &doc[..offset],
                heading,
                after: doc[offset + line.len()..].trim(),
            };
        }
        offset += line.len();
    }

    if doc.starts_with('#') {
        let (title, body) = doc.split_once('\n').unwrap_or((doc, ""));
        return ParsedDocument::HasTitleOnly {
            title: title.trim_end(),
            body: body.trim(),
        };
    }

    ParsedDocument::HeaderlessBody(doc)
}

fn is_unreleased_heading(line: &str) -> bool {
    line == UNRELEASED_HEADING || line == "## [Unreleased]"
}

/* ============================================================
   Merge
   ============================================================ */

/// New document text with `entry` at the top of the Unreleased section.
/// Existing non-blank lines are kept verbatim and in order.
pub fn merge(document: &str, entry: &Entry) -> String {
    let line = entry.render();

    match parse(document) {
        ParsedDocument::Empty => {
            format!("{}\n\n{}\n\n{}\n", DEFAULT_TITLE, UNRELEASED_HEADING, line)
        }

        ParsedDocument::HasUnreleased {
            before,
            heading,
            after,
        } => {
            format!("{}{}\n\n{}", before, heading, with_following(&line, after))
        }

        ParsedDocument::HasTitleOnly { title, body } => {
            format!(
                "{}\n\n{}\n\n{}",
                title,
                UNRELEASED_HEADING,
                with_following(&line, body)
            )
        }

        ParsedDocument::HeaderlessBody(body) => {
            format!(
                "{}\n\n{}\n\n{}\n\n{}\n",
                DEFAULT_TITLE, UNRELEASED_HEADING, line, body
            )
        }
    }
}

/// Entry line followed by `rest`; consecutive entries stay one list.
fn with_following(line: &str, rest: &str) -> String {
    if rest.is_empty() {
        format!("{}\n", line)
    } else if rest.starts_with("- ") {
        format!("{}\n{}\n", line, rest)
    } else {
        format!("{}\n\n{}\n", line, rest)
    }
}

/* ============================================================
   Storage
   ============================================================ */

/// Content as read at the start of a run, with its fingerprint.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub text: String,
    digest: Option<String>,
}

pub struct ChangelogStore {
    path: PathBuf,
}

impl ChangelogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty document.
    pub fn read(&self) -> Result<Snapshot> {
        let text = self.read_current()?;
        Ok(Snapshot {
            digest: text.as_deref().map(fingerprint),
            text: text.unwrap_or_default(),
        })
    }

    /// Replace the whole file with `new_text`, provided it still matches
    /// `snapshot`.
    pub fn replace(&self, snapshot: &Snapshot, new_text: &str) -> Result<()> {
        let current = self.read_current()?;
        if current.as_deref().map(fingerprint) != snapshot.digest {
            return Err(ChangelogError::persistence(
                &self.path,
                "file changed on disk since it was read; re-run to include those changes",
            ));
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp =
            NamedTempFile::new_in(&dir).map_err(|e| ChangelogError::persistence(&self.path, e))?;
        tmp.write_all(new_text.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| ChangelogError::persistence(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| ChangelogError::persistence(&self.path, e.error))?;

        debug!(path = %self.path.display(), bytes = new_text.len(), "changelog replaced");
        Ok(())
    }

    fn read_current(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChangelogError::persistence(&self.path, e)),
        }
    }
}

/// Read, merge and write back in one step. Returns the new document.
pub fn record(store: &ChangelogStore, entry: &Entry) -> Result<String> {
    let snapshot = store.read()?;
    let updated = merge(&snapshot.text, entry);
    store.replace(&snapshot, &updated)?;

    info!(path = %store.path().display(), "updated changelog");
    Ok(updated)
}

fn fingerprint(text: &str) -> String {
    let mut h = Sha256::new();
    h.update(text.as_bytes());
    hex::encode(h.finalize())
}
