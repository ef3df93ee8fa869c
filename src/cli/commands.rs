use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatsense")]
#[command(about = "Ingest chat exports and infer participant profiles")]
#[command(version)]
pub struct Args {
    /// Data directory holding config.json and the database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a WhatsApp export and print the messages as JSON
    Parse {
        /// Path to the exported chat (.txt)
        file: PathBuf,
    },
    /// Process a conversation payload and update participant profiles
    Process {
        /// Path to the payload JSON
        file: PathBuf,
    },
    /// List stored profiles for a main user
    Profiles {
        #[arg(long)]
        main_user: String,
        #[arg(long)]
        platform: Option<String>,
    },
    /// Show what is known about one participant
    Context {
        participant: String,
        #[arg(long)]
        main_user: String,
        #[arg(long)]
        platform: Option<String>,
    },
    /// Show the most recent important message per sender in an export
    Updates {
        /// Path to the exported chat (.txt)
        file: PathBuf,
        /// Maximum number of updates to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}
