// src/pipeline.rs

//! One changelog run: diff → prompt → generation → normalization → merge.
//!
//! Nothing is written unless every earlier stage succeeded, so a failed
//! run leaves the changelog exactly as it was.

use std::io::{self, BufRead, Write};

use tracing::info;

use crate::changelog::{self, ChangelogStore};
use crate::config::Config;
use crate::diff::{self, DiffMode};
use crate::entry;
use crate::error::Result;
use crate::git::{self, Vcs};
use crate::hooks::HOOK_ENV;
use crate::llm::ollama::TextGenerator;
use crate::llm::prompt;

/* ============================================================
   Invocation context
   ============================================================ */

/// CI systems recognised from their environment, as (variable, expected value, name).
const CI_MARKERS: [(&str, Option<&str>, &str); 5] = [
    ("GITHUB_ACTIONS", Some("true"), "github"),
    ("BITBUCKET_BUILD_NUMBER", None, "bitbucket"),
    ("GITLAB_CI", None, "gitlab"),
    ("JENKINS_URL", None, "jenkins"),
    ("CIRCLECI", None, "circleci"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub mode: DiffMode,
    pub unattended: bool,
}

impl Invocation {
    /// `--ci` or a detected CI wins over the hook marker; both imply
    /// unattended.
    pub fn detect(force_ci: bool, auto: bool, env: impl Fn(&str) -> Option<String>) -> Self {
        let ci = force_ci || ci_platform(&env).is_some();
        let post_merge = env(HOOK_ENV).as_deref() == Some("post-merge");

        let mode = if ci {
            DiffMode::ContinuousIntegration
        } else if post_merge {
            DiffMode::PostMerge
        } else {
            DiffMode::Manual
        };

        Self {
            mode,
            unattended: auto || ci || post_merge,
        }
    }
}

pub fn ci_platform(env: &impl Fn(&str) -> Option<String>) -> Option<&'static str> {
    CI_MARKERS.iter().find_map(|(var, expected, name)| {
        let value = env(*var)?;
        match expected {
            Some(want) if value != *want => None,
            _ if value.is_empty() => None,
            _ => Some(*name),
        }
    })
}

/* ============================================================
   Confirmation boundary
   ============================================================ */

pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Asks on the terminal; an empty answer means yes.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        print!("{} [Y/n]: ", question);
        let _ = io::stdout().flush();

        read_answer(&mut io::stdin().lock())
    }
}

/// End of input is a refusal, not an empty answer.
fn read_answer(input: &mut impl BufRead) -> bool {
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => is_yes(&answer),
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    )
}

/* ============================================================
   Run
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoChanges,
    Declined { line: String },
    Recorded { line: String },
}

pub struct Pipeline<'a> {
    pub cfg: &'a Config,
    pub vcs: &'a dyn Vcs,
    pub generator: &'a dyn TextGenerator,
    pub store: &'a ChangelogStore,
}

impl Pipeline<'_> {
    pub fn run(&self, invocation: Invocation, confirm: &mut dyn Confirm) -> Result<Outcome> {
        info!(mode = ?invocation.mode, "checking for changes");
        let Some(ctx) = diff::resolve(self.vcs, invocation.mode, self.cfg.max_diff_chars) else {
            info!("no changes detected");
            return Ok(Outcome::NoChanges);
        };

        let request = prompt::build_request(self.cfg, &ctx.raw_text);
        info!(model = %request.model, truncated = ctx.truncated, "generating changelog entry");
        let generated = self.generator.generate(&request)?;

        let metadata = git::commit_metadata(self.vcs);
        let entry = entry::normalize(&generated.text, &metadata);
        let line = entry.render();
        info!(
            category = %entry.category,
            preformatted = entry.is_passthrough(),
            "generated changelog entry"
        );

        if !invocation.unattended {
            let question = format!("{}\nWrite this entry to {}?", line, self.store.path().display());
            if !confirm.confirm(&question) {
                info!("cancelled");
                return Ok(Outcome::Declined { line });
            }
        }

        changelog::record(self.store, &entry)?;
        Ok(Outcome::Recorded { line })
    }
}
