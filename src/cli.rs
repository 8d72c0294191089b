// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Rebuild atomic commits from a per-file legacy history and replay them into git", long_about = None)]
pub struct Args {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Group the legacy revision history into commits and write the commit list
    Reconstruct {
        /// Exported JSON metadata of the legacy store
        #[arg(short, long)]
        dump: PathBuf,

        /// Where to write the commit list
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Where to write the human-readable audit log
        #[arg(long)]
        audit_log: Option<PathBuf>,

        /// Longest gap between saves of one editing session, in seconds
        #[arg(long)]
        silence_span_secs: Option<u64>,

        /// Author mapping file (repeatable; later files win)
        #[arg(long = "author-map")]
        author_maps: Vec<PathBuf>,

        /// Abort when any legacy identity has no mapping
        #[arg(long)]
        strict_authors: bool,
    },

    /// Replay a commit list into a git work tree
    Replay {
        /// Commit list written by `reconstruct`
        #[arg(long)]
        commits: Option<PathBuf>,

        /// Directory holding file versions as <path>,v<version>
        #[arg(long)]
        content: PathBuf,

        /// Git work tree to commit into (created when missing)
        #[arg(short, long)]
        worktree: PathBuf,

        /// Domain for authors mapped without an email
        #[arg(long)]
        email_domain: Option<String>,

        /// Stage whole directories instead of individual files
        #[arg(long)]
        stage_directories: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_repeated_author_maps() {
        let args = Args::parse_from([
            "legacy2git",
            "reconstruct",
            "--dump",
            "dump.json",
            "--author-map",
            "a.txt",
            "--author-map",
            "b.txt",
            "--strict-authors",
        ]);
        match args.command {
            Command::Reconstruct {
                author_maps,
                strict_authors,
                ..
            } => {
                assert_eq!(author_maps, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert!(strict_authors);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
