use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use tally_core::VERSION;

/// Tally - versioned, partially encrypted record datasets
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new dataset with a fresh key hierarchy
    Init(InitArgs),

    /// Append a record
    Add(AddArgs),

    /// Decrypt and print records
    Show(ShowArgs),

    /// Change the passphrase without touching encrypted fields
    Passwd(DatasetArgs),

    /// Replace every key and re-encrypt every protected field
    Rekey(DatasetArgs),

    /// Compare two datasets
    Diff(DiffArgs),
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Path where the dataset will be created
    #[arg(value_name = "DATASET")]
    pub path: PathBuf,

    /// Overwrite an existing dataset
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `add` command
#[derive(Args)]
pub struct AddArgs {
    #[arg(value_name = "DATASET")]
    pub path: PathBuf,

    /// Plain field as ID=VALUE (e.g. 1=money:1250)
    #[arg(short, long = "field", value_name = "ID=VALUE")]
    pub fields: Vec<String>,

    /// Encrypted field as ID=VALUE
    #[arg(short, long = "secret", value_name = "ID=VALUE")]
    pub secrets: Vec<String>,
}

/// Arguments for the `show` command
#[derive(Args)]
pub struct ShowArgs {
    #[arg(value_name = "DATASET")]
    pub path: PathBuf,

    /// Include deleted records
    #[arg(long)]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// A command that only needs the dataset path
#[derive(Args)]
pub struct DatasetArgs {
    #[arg(value_name = "DATASET")]
    pub path: PathBuf,
}

/// Arguments for the `diff` command
#[derive(Args)]
pub struct DiffArgs {
    /// Earlier version of the dataset
    #[arg(value_name = "OLD")]
    pub old: PathBuf,

    /// Later version of the dataset
    #[arg(value_name = "NEW")]
    pub new: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
