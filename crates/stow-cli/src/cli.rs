use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stow",
    about = "Stow: page records in and out of a persistent object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data file; overrides the configured adapter with a file adapter
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a record and print its identity
    Put(PutArgs),
    /// Show a record by identity
    Get(GetArgs),
    /// Show the record a secondary index entry points at
    Find(FindArgs),
    /// Delete a record and its index entries
    Delete(DeleteArgs),
    /// List stored identities
    List,
    /// Show store contents and counters
    Stats,
    /// Rewrite the data file without dead records
    Compact,
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct PutArgs {
    /// Identity to store under; generated if omitted
    #[arg(long)]
    pub id: Option<String>,
    /// Field assignment, `key=value`
    #[arg(long = "set", value_parser = parse_assignment, required = true)]
    pub fields: Vec<(String, String)>,
    /// Field to maintain a secondary index for
    #[arg(long = "index")]
    pub indexed: Vec<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
}

#[derive(Args)]
pub struct FindArgs {
    pub name: String,
    pub value: String,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: String,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
