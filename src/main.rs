// src/main.rs

mod changelog;
mod config;
mod diff;
mod entry;
mod error;
mod git;
mod hooks;
mod llm;
mod logger;
mod pipeline;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use crate::{
    changelog::ChangelogStore,
    config::{Config, Overrides},
    error::{ChangelogError, Result},
    git::Git,
    hooks::{HookManager, InstallOutcome, UninstallOutcome},
    llm::ollama::OllamaClient,
    pipeline::{ci_platform, Invocation, Outcome, Pipeline, StdinConfirm},
};

#[derive(Parser)]
#[command(
    name = "changelog-synth",
    version,
    about = "Summarize git changes into a CHANGELOG.md entry with a local Ollama model."
)]
struct Cli {
    /// Install the post-merge hook that runs this tool after every merge
    #[arg(long, conflicts_with_all = ["uninstall", "setup"])]
    install: bool,

    /// Remove the post-merge hook (only if it was installed by this tool)
    #[arg(long, conflicts_with = "setup")]
    uninstall: bool,

    /// Check the Ollama service and download the model, then exit
    #[arg(long)]
    setup: bool,

    /// Write the entry without asking for confirmation
    #[arg(long)]
    auto: bool,

    /// Summarize the current merge commit (CI mode)
    #[arg(long)]
    ci: bool,

    /// Model to use instead of the configured one
    #[arg(long)]
    model: Option<String>,

    /// Changelog file, relative to the repository root
    #[arg(long)]
    changelog: Option<PathBuf>,

    /// Read settings from this TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose, cli.json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().map_err(|_| ChangelogError::NotARepository)?;
    let root = git::repo_root(&Git::new(&cwd));

    let overrides = Overrides {
        config_file: cli.config.clone(),
        model: cli.model.clone(),
        changelog_file: cli.changelog.clone(),
    };
    let cfg = Config::load(root.as_deref(), &overrides)?;
    let client = OllamaClient::new(&cfg)?;
    let mut confirm = StdinConfirm;

    let env = |k: &str| std::env::var(k).ok();
    let invocation = Invocation::detect(cli.ci, cli.auto, env);
    if let Some(platform) = ci_platform(&env) {
        info!(platform, "detected CI platform");
    }

    if cli.install || cli.uninstall {
        let root = root.ok_or(ChangelogError::NotARepository)?;
        let git = Git::new(&root);
        let manager = HookManager::new(git.dir(), &git::hooks_dir(&git, &root), &cfg);
        let hook = &manager.installation().script_path;

        if cli.uninstall {
            match manager.uninstall()? {
                UninstallOutcome::Removed => println!("Removed {}", hook.display()),
                UninstallOutcome::NotInstalled => println!("No hook installed, nothing to remove"),
            }
            return Ok(());
        }

        match manager.install()? {
            InstallOutcome::Installed => println!("Installed {}", hook.display()),
            InstallOutcome::AlreadyInstalled => {
                println!("Hook already installed at {}", hook.display());
                return Ok(());
            }
        }

        if let Err(e) = setup::ensure_ready(&client, &cfg, invocation.unattended, &mut confirm) {
            warn!("{}; run `changelog-synth --setup` once Ollama is available", e);
        }
        return Ok(());
    }

    if cli.setup {
        setup::ensure_ready(&client, &cfg, invocation.unattended, &mut confirm)?;
        println!("Setup complete, model '{}' is ready", cfg.model);
        return Ok(());
    }

    let root = root.ok_or(ChangelogError::NotARepository)?;
    let git = Git::new(&root);
    setup::ensure_ready(&client, &cfg, invocation.unattended, &mut confirm)?;

    let store = ChangelogStore::new(root.join(&cfg.changelog_file));
    let pipeline = Pipeline {
        cfg: &cfg,
        vcs: &git,
        generator: &client,
        store: &store,
    };

    match pipeline.run(invocation, &mut confirm)? {
        Outcome::NoChanges => println!("No changes detected"),
        Outcome::Declined { .. } => println!("Cancelled"),
        Outcome::Recorded { line } => println!("{}", line),
    }
    Ok(())
}
