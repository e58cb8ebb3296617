// src/error.rs

//! Error types for the changelog pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort an invocation with a non-zero exit code.
///
/// "No changes detected" is not represented here; it is a successful
/// [`crate::pipeline::Outcome`].
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// Connection refused or otherwise unable to reach the service
    #[error("generation service unreachable at {url}: is Ollama running? try `ollama serve` ({reason})")]
    ServiceUnreachable { url: String, reason: String },

    /// The generation call exceeded its deadline
    #[error("generation request timed out after {secs}s")]
    ServiceTimeout { secs: u64 },

    /// Body was not JSON or lacked the expected text field
    #[error("malformed response from generation service: {0}")]
    MalformedServiceResponse(String),

    /// The service answered with an empty completion
    #[error("generation service returned an empty response")]
    EmptyGeneration,

    /// Non-success HTTP status from the service
    #[error("generation service answered {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    /// Required model is not present in the service's listing
    #[error("model '{0}' is not available; run `ollama pull {0}` or `changelog-synth --setup`")]
    ModelUnavailable(String),

    /// Reading, writing or renaming the changelog document failed
    #[error("could not persist {path}: {reason}")]
    DocumentPersistence { path: PathBuf, reason: String },

    /// Missing entry point, or a foreign hook occupies the slot
    #[error("cannot install hook: {0}")]
    HookPrecondition(String),

    /// Refused to delete a hook that this tool did not write
    #[error("hook at {0} was not installed by changelog-synth; not removing it")]
    UnrecognizedHook(PathBuf),

    /// Not inside a git work tree
    #[error("not inside a git repository")]
    NotARepository,

    /// Invalid configuration file or value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChangelogError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ChangelogError::DocumentPersistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChangelogError>;
