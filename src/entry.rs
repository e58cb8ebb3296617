// src/entry.rs

//! Turns whatever the model produced into one changelog line.
//!
//! Normalization is total: every input yields a well-formed [`Entry`],
//! text that follows no known convention falls back to `feat`.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

/* ============================================================
   Taxonomy
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Feat,
    Fix,
    Refactor,
    Docs,
    Chore,
    Perf,
    Test,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Feat,
        Category::Fix,
        Category::Refactor,
        Category::Docs,
        Category::Chore,
        Category::Perf,
        Category::Test,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Feat => "feat",
            Category::Fix => "fix",
            Category::Refactor => "refactor",
            Category::Docs => "docs",
            Category::Chore => "chore",
            Category::Perf => "perf",
            Category::Test => "test",
        }
    }

    /// Bracketed markers emitted by older prompts, e.g. `[Feature]`.
    fn from_legacy_marker(word: &str) -> Option<Category> {
        let c = match word.to_ascii_lowercase().as_str() {
            "feature" | "feat" => Category::Feat,
            "fix" | "bugfix" => Category::Fix,
            "refactor" => Category::Refactor,
            "docs" | "documentation" => Category::Docs,
            "chore" => Category::Chore,
            "perf" | "performance" => Category::Perf,
            "test" | "tests" => Category::Test,
            _ => return None,
        };
        Some(c)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* ============================================================
   Entry
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    pub timestamp_display: String,
    pub files_changed: usize,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub category: Category,
    pub description: String,
    pub metadata: CommitMetadata,
    /// Set when the input was already a rendered changelog line.
    verbatim: Option<String>,
}

const EMPTY_DESCRIPTION: &str = "no description provided";

impl Entry {
    /// The `- ...` line as it is written to the changelog.
    pub fn render(&self) -> String {
        if let Some(line) = &self.verbatim {
            return format!("- {}", line);
        }

        let m = &self.metadata;
        format!(
            "- {} | {} {} | by {} - {}: {}",
            m.timestamp_display,
            m.files_changed,
            if m.files_changed == 1 { "file" } else { "files" },
            m.author,
            self.category,
            self.description
        )
    }

    pub fn is_passthrough(&self) -> bool {
        self.verbatim.is_some()
    }
}

/// `Dec 31, 2025 at 2:30 PM`
pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%b %d, %Y at %-I:%M %p").to_string()
}

fn timestamp_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Z][a-z]{2} \d{1,2}, \d{4} at \d{1,2}:\d{2} [AP]M")
            .expect("timestamp pattern is valid")
    })
}

/* ============================================================
   Normalization
   ============================================================ */

pub fn normalize(raw: &str, metadata: &CommitMetadata) -> Entry {
    let text = strip_list_marker(first_line(raw));

    if let Some(category) = already_formatted(text) {
        return Entry {
            category,
            description: text.to_string(),
            metadata: metadata.clone(),
            verbatim: Some(text.to_string()),
        };
    }

    let (category, description) = conventional_prefix(text)
        .or_else(|| legacy_marker(text))
        .unwrap_or((Category::Feat, text));

    let description = description.trim();
    Entry {
        category,
        description: if description.is_empty() {
            EMPTY_DESCRIPTION.to_string()
        } else {
            description.to_string()
        },
        metadata: metadata.clone(),
        verbatim: None,
    }
}

/// Models like to append an explanation; only the first non-blank line is
/// the entry.
fn first_line(raw: &str) -> &str {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

fn strip_list_marker(text: &str) -> &str {
    ["- ", "+ ", "* "]
        .iter()
        .find_map(|m| text.strip_prefix(m))
        .map(str::trim_start)
        .unwrap_or(text)
}

/// A previously rendered line: timestamp first, ` - <category>:` later.
fn already_formatted(text: &str) -> Option<Category> {
    if !timestamp_prefix().is_match(text) {
        return None;
    }

    let lower = text.to_ascii_lowercase();
    Category::ALL
        .iter()
        .filter_map(|c| lower.find(&format!(" - {}:", c)).map(|at| (at, *c)))
        .min_by_key(|(at, _)| *at)
        .map(|(_, c)| c)
}

fn conventional_prefix(text: &str) -> Option<(Category, &str)> {
    Category::ALL.iter().find_map(|c| {
        let prefix = format!("{}:", c);
        let head = text.get(..prefix.len())?;
        head.eq_ignore_ascii_case(&prefix)
            .then(|| (*c, &text[prefix.len()..]))
    })
}

fn legacy_marker(text: &str) -> Option<(Category, &str)> {
    let inner = text.strip_prefix('[')?;
    let close = inner.find(']')?;
    let category = Category::from_legacy_marker(&inner[..close])?;

    let rest = inner[close + 1..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('-'))
        .unwrap_or(rest);

    Some((category, rest))
}
