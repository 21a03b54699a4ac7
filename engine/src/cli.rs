//! CLI interface for Quill
//!
//! Defines every command and global flag using clap's derive API.

use clap::{Parser, Subcommand};
use sdk::types::Vibe;
use std::path::PathBuf;

/// Quill editorial pipeline
///
/// Researches a trend, writes and critiques a LinkedIn post in one of several
/// editorial personas, publishes it, and learns from how past posts performed.
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one pipeline run
    Run {
        /// Topic to research instead of a random pick
        #[arg(short, long)]
        topic: Option<String>,

        /// Force a persona (contrarian, visionary, educator, analyst, narrator, oracle, satirist)
        #[arg(short, long, value_parser = parse_vibe)]
        persona: Option<Vibe>,

        /// Attempts per upstream call
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,

        /// Publish without generating an image
        #[arg(long)]
        no_image: bool,
    },

    /// Show persona performance and recent runs
    Stats,

    /// Show published posts with their latest performance
    History {
        /// Number of posts to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List learned critic rules
    Rules,

    /// Show the latest comment pack
    Comments,

    /// Record manually observed engagement for a post
    Record {
        /// Post urn as returned at publish time
        urn: String,

        /// Impressions; left unknown when omitted
        #[arg(long)]
        views: Option<u64>,

        #[arg(long, default_value = "0")]
        likes: u64,

        #[arg(long, default_value = "0")]
        comments: u64,
    },

    /// Fetch engagement for all published posts
    Refresh,
}

fn parse_vibe(s: &str) -> Result<Vibe, String> {
    s.parse()
}
