//! CLI module for tunepull

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser, Debug)]
#[command(name = "tunepull", about = "Download playlist audio with a resumable queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every track of a playlist as MP3
    Fetch {
        /// Playlist URL
        #[arg(value_name = "URL")]
        url: String,

        /// Output folder for downloaded tracks
        #[arg(short, long, env = "TUNEPULL_OUTPUT")]
        output: Option<PathBuf>,

        /// Number of concurrent downloads
        #[arg(short, long, default_value = "5")]
        concurrency: usize,

        /// Playlist entries fetched per metadata page
        #[arg(long, default_value = "10")]
        page_size: u32,

        /// Enumerate the whole playlist before downloading starts
        #[arg(long)]
        bulk: bool,
    },

    /// Show what an output folder already contains
    Status {
        /// Output folder to inspect
        #[arg(short, long, env = "TUNEPULL_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
