// src/llm/prompt.rs

use serde::Serialize;

use crate::config::Config;

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

pub fn build_request(cfg: &Config, diff: &str) -> GenerationRequest {
    GenerationRequest {
        model: cfg.model.clone(),
        prompt: format!("{}\n\n{}", system_prompt(), user_prompt(diff)),
        stream: false,
    }
}

/* ============================================================
   System prompt (stable, reused)
   ============================================================ */

fn system_prompt() -> &'static str {
    r#"You are a Senior Technical Writer. Summarize the following code changes into a single, concise changelog entry.

Use Conventional Commits format with one of these prefixes:
- feat: for new features
- fix: for bug fixes
- refactor: for code refactoring
- docs: for documentation changes
- chore: for maintenance tasks
- perf: for performance improvements
- test: for test changes

Example output: feat: add user authentication with OAuth2 support

Do not output any preamble, conversational text, or bullet points. Just the single line entry."#
}

fn user_prompt(diff: &str) -> String {
    format!("Code changes:\n\n{}", diff)
}
