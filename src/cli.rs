use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "textbook-indexer",
    version,
    about = "Index local textbook PDFs into the remote textbook store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the PDFs under the textbook root with the metadata inferred from their paths.
    Inventory(InventoryArgs),
    /// Extract every PDF page by page and replace its pages in the remote store.
    Index(IndexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    /// Overrides LOCAL_TEXTBOOKS_ROOT.
    #[arg(long)]
    pub root: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Overrides LOCAL_TEXTBOOKS_ROOT.
    #[arg(long)]
    pub root: Option<PathBuf>,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,
}
