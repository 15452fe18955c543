use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pilot",
    about = "Chat with an agent that drives the page you are looking at",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a page in a WebDriver browser and attach the chat widget to it
    Open {
        /// The starting URL
        #[arg(short, long)]
        url: String,

        /// Chat back-end base URL (defaults to $PILOT_API_URL or http://localhost:8000)
        #[arg(long)]
        api: Option<String>,

        /// WebDriver endpoint
        #[arg(long)]
        webdriver: Option<String>,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },

    /// Parse a recorded agent response offline, as if it arrived in chunks
    Replay {
        /// File holding the raw response body
        #[arg(short, long)]
        file: PathBuf,

        /// Bytes per simulated network chunk
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,
    },
}
