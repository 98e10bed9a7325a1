//! CLI argument definitions using clap derive

use crate::config::TokenType;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// art - install GitLab CI artifacts
///
/// Resolves the artifacts declared in artifacts.yml to immutable ids,
/// caches their archives and installs selected files into the working tree.
#[derive(Parser, Debug)]
#[command(name = "art")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ART_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory (defaults to the user cache, or .art-cache in GitLab CI)
    #[arg(long, global = true, env = "ART_CACHE_DIR")]
    pub cache: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store the GitLab URL and access token
    Configure(ConfigureArgs),

    /// Resolve artifacts.yml into artifacts.lock.yml
    Update(UpdateArgs),

    /// Download every locked archive into the cache
    Download,

    /// Install locked artifacts into the working directory
    Install(InstallArgs),

    /// Remove files installed from the lock manifest
    Clean(CleanArgs),

    /// Inspect or purge the archive cache
    Cache(CacheArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Token kinds accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TokenTypeArg {
    /// Personal or project access token
    Private,
    /// CI job token
    Job,
    /// OAuth device flow; the token argument is the application id
    Oauth,
}

impl From<TokenTypeArg> for TokenType {
    fn from(arg: TokenTypeArg) -> Self {
        match arg {
            TokenTypeArg::Private => TokenType::Private,
            TokenTypeArg::Job => TokenType::Job,
            TokenTypeArg::Oauth => TokenType::Oauth,
        }
    }
}

/// Arguments for the configure command
#[derive(Parser, Debug)]
pub struct ConfigureArgs {
    /// GitLab base URL (e.g. https://gitlab.com/)
    pub gitlab_url: String,

    /// Kind of token given
    #[arg(short, long, value_enum, default_value = "private")]
    pub token_type: TokenTypeArg,

    /// Access token, or OAuth application id for --token-type oauth
    pub token: String,
}

/// Arguments for the update command
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Record directories that receive no files
    #[arg(short, long)]
    pub keep_empty_dirs: bool,

    /// Print the lock manifest as JSON instead of progress
    #[arg(long)]
    pub json: bool,

    /// Remove files the previous lock installed that the new one does not
    #[arg(long)]
    pub clean: bool,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Print installed entries as JSON instead of progress
    #[arg(long)]
    pub json: bool,

    /// Create directories that receive no files
    #[arg(short, long)]
    pub keep_empty_dirs: bool,

    /// Recompute installed files from the archives instead of the lock
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Show what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached projects with their sizes
    List {
        /// Largest first instead of by name
        #[arg(short, long)]
        sort_size: bool,

        /// Sizes in KB/MB/GB instead of bytes
        #[arg(short = 'H', long)]
        human_readable: bool,
    },
    /// Remove cached archives of matching projects
    Purge {
        /// Glob patterns over project paths (all projects when omitted)
        patterns: Vec<String>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
