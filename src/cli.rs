use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelgrab")]
#[command(author, version, about = "Resolve Instagram posts into direct video or MP3 links", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (default: reelgrab.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server
    Run {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the request counter and exit
    Stats,

    /// Run every due remote deletion once and exit
    Sweep,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
