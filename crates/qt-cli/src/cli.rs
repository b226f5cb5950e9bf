use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qt", about = "Versioned macro-object repository", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory, holding `qt.toml` and the releases.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub repo: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a release (and the repository configuration if missing)
    Init(InitArgs),
    /// Store local files as sources
    Store(StoreArgs),
    /// Print the content of a source
    Fetch(FetchArgs),
    /// Remove sources
    Waste(WasteArgs),
    /// Print a source with its references expanded
    Resolve(ResolveArgs),
    /// List the referrers of objects
    Deps(DepsArgs),
    /// Check stored sources without changing them
    Lint(LintArgs),
    /// Show an object record or a source's nature and meta
    Show(ShowArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub release: String,
}

#[derive(Args)]
pub struct StoreArgs {
    pub release: String,
    /// `QPATH=FILE` pairs
    #[arg(required = true)]
    pub items: Vec<String>,
    /// Digest the current content must have
    #[arg(long)]
    pub digest: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args)]
pub struct FetchArgs {
    pub release: String,
    pub path: String,
}

#[derive(Args)]
pub struct WasteArgs {
    pub release: String,
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct LintArgs {
    pub release: String,
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct ResolveArgs {
    pub release: String,
    pub path: String,
    /// Reference kinds to expand, e.g. `rilmt`
    #[arg(short, long)]
    pub mode: Option<String>,
    /// `NAME=VALUE` texts for `t4_` tokens
    #[arg(short, long)]
    pub text: Vec<String>,
}

#[derive(Args)]
pub struct DepsArgs {
    pub release: String,
    #[arg(required = true)]
    pub objects: Vec<String>,
    /// Follow object referrers to the sources that finally use them
    #[arg(long)]
    pub deep: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub release: String,
    /// Object name (`m4_X`) or source path (`/app/a.m`)
    pub target: String,
}
