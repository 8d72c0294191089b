// src/main.rs

mod authors;
mod cli;
mod codec;
mod config;
mod interner;
mod labels;
mod model;
mod pipeline;
mod reconstruct;
mod replay;
mod source;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Command};
use config::MigrationConfig;
use reconstruct::{CancelToken, ReconstructError};
use replay::{DirectoryStore, GitDriver, ReplayError, ReplayOptions};
use source::JsonDump;
use std::process::ExitCode;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let start_time = Instant::now();
    match run(args) {
        Ok(()) => {
            println!("Total time: {:.2?}", start_time.elapsed());
            ExitCode::SUCCESS
        }
        Err(err) if is_stopped(&err) => {
            eprintln!("stopped; rerun to start over");
            ExitCode::from(130)
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn is_stopped(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ReconstructError>(), Some(ReconstructError::Stopped))
        || matches!(err.downcast_ref::<ReplayError>(), Some(ReplayError::Stopped))
}

fn run(args: Args) -> Result<()> {
    let mut config = MigrationConfig::load(args.config.as_deref())?;
    let show_progress = !args.quiet;
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after the current step");
        handler_token.cancel();
    })
    .context("Failed to install interrupt handler")?;

    match args.command {
        Command::Reconstruct {
            dump,
            out,
            audit_log,
            silence_span_secs,
            author_maps,
            strict_authors,
        } => {
            if let Some(secs) = silence_span_secs {
                config.silence_span_secs = secs;
            }
            if !author_maps.is_empty() {
                config.author_maps = author_maps;
            }
            config.strict_authors |= strict_authors;
            let commit_list = out.unwrap_or_else(|| config.commit_list.clone());
            let audit_log = audit_log.unwrap_or_else(|| config.audit_log.clone());

            let source = JsonDump::load(&dump)?;
            let result = pipeline::run_reconstruction(&source, &config, &cancel, show_progress)?;
            pipeline::persist(&result, &commit_list, &audit_log)?;
            println!(
                "Reconstructed {} commits from {} revisions ({} unreadable).",
                result.commits.len(),
                result.revisions,
                result.failures
            );
        }
        Command::Replay {
            commits,
            content,
            worktree,
            email_domain,
            stage_directories,
        } => {
            let options = ReplayOptions {
                email_domain: email_domain.unwrap_or_else(|| config.email_domain.clone()),
                stage_directories: stage_directories || config.stage_directories,
            };
            let commit_list = commits.unwrap_or_else(|| config.commit_list.clone());
            let mut driver = GitDriver::open_or_init(&worktree)
                .with_context(|| format!("Failed to open work tree {}", worktree.display()))?;
            let store = DirectoryStore::new(content);
            let stats = pipeline::run_replay(&commit_list, &mut driver, &store, &options, &cancel, show_progress)?;
            println!(
                "Replayed {} commits ({} unchanged), {} tags, {} versions without content.",
                stats.commits, stats.unchanged, stats.tags, stats.missing_content
            );
        }
    }
    Ok(())
}
