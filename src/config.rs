use crate::cli::Cli;
use crate::paths::normalize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "git-asset-stager";

/// settings resolved once at startup from flags, environment and defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_root: PathBuf,
    pub context: PathBuf,
    pub git: String,
    pub data_dir: PathBuf,
    pub auto_clean: bool,
    pub verbose: u8,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        Self::resolve(cli, &current_dir(), dirs::data_local_dir())
    }

    fn resolve(cli: &Cli, cwd: &Path, data_local: Option<PathBuf>) -> Self {
        let project_root = normalize(&cwd.join(&cli.project));
        let context = cli
            .context
            .as_ref()
            .map_or_else(|| project_root.clone(), |dir| normalize(&cwd.join(dir)));
        let data_dir = match &cli.data_dir {
            Some(dir) => normalize(&cwd.join(dir)),
            // no platform data dir: keep state next to the project
            None => data_local.map_or_else(|| project_root.join(".git-asset-stager"), |d| d.join(APP_DIR)),
        };
        Self {
            project_root,
            context,
            git: cli.git.clone(),
            data_dir,
            auto_clean: !cli.no_auto_clean,
            verbose: cli.verbose,
        }
    }

    /// tracing filter directive used when RUST_LOG is not set
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
