use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// git-asset-stager: stage, unstage and commit project assets without blocking on git
#[derive(Parser, Debug)]
#[command(
    name = "git-asset-stager",
    about,
    long_about = None,
    disable_version_flag = true
)]
pub struct Cli {
    /// project root; paths on the command line are relative to it
    #[arg(long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// directory used to locate the repository (defaults to the project root)
    #[arg(long, global = true)]
    pub context: Option<PathBuf>,

    /// git executable
    #[arg(long, global = true, env = "GIT_ASSET_STAGER_GIT", default_value = "git")]
    pub git: String,

    /// where staged ownership and commit history are kept
    #[arg(long, global = true, env = "GIT_ASSET_STAGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// leave paths staged by other tools alone when opening
    #[arg(long, global = true)]
    pub no_auto_clean: bool,

    /// more diagnostics (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// show changes, optionally only those relevant to the given paths
    Status {
        paths: Vec<String>,
    },

    /// stage paths (sidecar .meta files follow their assets)
    Stage {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// unstage paths
    Unstage {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// commit what is staged
    Commit {
        /// commit message; prompted for when missing
        #[arg(short, long)]
        message: Option<String>,

        /// push after committing
        #[arg(long)]
        push: bool,

        /// write the message in $EDITOR
        #[arg(long, conflicts_with = "message")]
        long: bool,
    },

    /// push the current branch
    Push,

    /// list saved commit messages and recent commit subjects
    History {
        /// only subjects authored by the configured git identity
        #[arg(long)]
        mine: bool,
    },

    /// unstage everything this tool did not stage
    Clean,

    /// keep a live view of changes and act on them with single keys
    Interactive,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
