//! Command-line interface parsing for the stalkermeta maintenance tool
//!
//! This module handles parsing of CLI arguments using clap. The binary is a
//! cache maintenance and lookup utility; the listing refresh itself runs
//! inside the host application.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::data::MediaKind;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified media kind is not recognized
    #[error("Invalid media kind: '{0}'. Valid kinds: movie, series")]
    InvalidMediaKind(String),
}

/// Stalkermeta - portal listing cache maintenance and TMDB lookups
#[derive(Parser, Debug)]
#[command(name = "stalkermeta")]
#[command(about = "Inspect and maintain the portal listing cache, look up TMDB metadata")]
#[command(version)]
pub struct Cli {
    /// Storage directory holding the cache files
    /// (defaults to the platform-specific data directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report cache freshness for every listing kind
    Status,
    /// Check whether the configured portal changed; wipes the listing cache
    /// on a change, like the background service would
    Reconcile {
        /// Portal server address
        #[arg(long)]
        server: String,
        /// Device MAC address
        #[arg(long)]
        mac: String,
    },
    /// Delete every portal-scoped cache file (TMDB cache is kept)
    Clear,
    /// Search TMDB for one title and print the parsed metadata
    Lookup {
        /// Title to search for
        title: String,
        /// movie or series
        #[arg(long, default_value = "movie")]
        kind: String,
        /// Release year to narrow the search
        #[arg(long)]
        year: Option<u16>,
        /// TMDB API v3 key
        #[arg(long, env = "TMDB_API_KEY")]
        api_key: String,
        /// Preferred result language
        #[arg(long, default_value = "en-US")]
        language: String,
    },
}

/// Parses a media kind string argument into a MediaKind enum.
pub fn parse_media_kind_arg(s: &str) -> Result<MediaKind, CliError> {
    MediaKind::from_str(s).ok_or_else(|| CliError::InvalidMediaKind(s.to_string()))
}
