//! Stalkermeta maintenance tool
//!
//! Inspects and maintains the portal listing cache, checks the portal
//! identity, and runs one-off TMDB lookups from the command line.

use clap::Parser;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use stalkermeta::cache::{portal, CategoryVideoCache};
use stalkermeta::cli::{parse_media_kind_arg, Cli, Command};
use stalkermeta::config::LISTING_CACHE_DEFAULT_DAYS;
use stalkermeta::data::{ListingKind, MediaKind, TmdbClient};

fn storage_dir(cli_override: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(dir) = cli_override {
        return Some(dir);
    }
    ProjectDirs::from("", "", "stalkermeta").map(|dirs| dirs.data_local_dir().to_path_buf())
}

fn print_status(dir: &Path) {
    let cache = CategoryVideoCache::new(dir, LISTING_CACHE_DEFAULT_DAYS);
    println!("Storage: {}", dir.display());
    for kind in ListingKind::ALL {
        let state = if cache.categories_are_stale(kind) {
            "stale or missing"
        } else {
            "fresh"
        };
        println!("  {:<8} categories: {}", kind.as_str(), state);
    }
}

async fn run_lookup(
    dir: &Path,
    kind: MediaKind,
    title: &str,
    year: Option<u16>,
    api_key: String,
    language: String,
) -> ExitCode {
    let mut client = TmdbClient::new(dir, api_key, language, 30);
    let result = match kind {
        MediaKind::Movie => client.lookup_movie(title, year).await,
        MediaKind::Tv => client.lookup_series(title, year).await,
    };
    client.flush();
    match result {
        Ok(Some(info)) => {
            println!("{:#?}", info);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("No match for '{}'", title);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let Some(dir) = storage_dir(cli.storage_dir) else {
        eprintln!("No storage directory available; pass --storage-dir");
        return ExitCode::FAILURE;
    };

    match cli.command {
        Command::Status => {
            print_status(&dir);
            ExitCode::SUCCESS
        }
        Command::Reconcile { server, mac } => {
            if portal::reconcile(&dir, &server, &mac) {
                println!("Portal changed: listing cache cleared, TMDB cache kept");
            } else {
                println!("Portal unchanged");
            }
            ExitCode::SUCCESS
        }
        Command::Clear => {
            portal::clear_portal_scoped_files(&dir);
            println!("Listing cache cleared");
            ExitCode::SUCCESS
        }
        Command::Lookup {
            title,
            kind,
            year,
            api_key,
            language,
        } => match parse_media_kind_arg(&kind) {
            Ok(kind) => run_lookup(&dir, kind, &title, year, api_key, language).await,
            Err(err) => {
                eprintln!("{}", err);
                ExitCode::FAILURE
            }
        },
    }
}
