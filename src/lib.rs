//! Spotify chart dataset harvester.
//!
//! This library assembles a dataset of daily regional Spotify chart rankings
//! joined with track, album and artist metadata. It downloads chart files from
//! the charts backend, fetches metadata from the official Web API, queries the
//! internal credits and lyrics endpoints and writes everything to CSV,
//! Parquet and JSONL files that can be resumed after an interruption. Finished
//! files can be copied to an S3-compatible bucket.
//!
//! # Modules
//!
//! - `charts` - Chart download (one CSV per region and date) and combination
//! - `cli` - Command-line interface implementations
//! - `columnar` - Parquet reading and writing
//! - `config` - Configuration management and environment variables
//! - `error` - Error types shared by the modules
//! - `internal` - Internal API endpoints (credits, lyrics)
//! - `management` - Credentials and resume state
//! - `output` - CSV tables and JSONL append logs
//! - `pool` - Bounded-queue worker pool shared by all downloaders
//! - `spotify` - Spotify Web API client and metadata processors
//! - `types` - Data structures and type definitions
//! - `upload` - Copying outputs to S3-compatible storage
//! - `utils` - Utility functions and helpers

pub mod charts;
pub mod cli;
pub mod columnar;
pub mod config;
pub mod error;
pub mod internal;
pub mod management;
pub mod output;
pub mod pool;
pub mod spotify;
pub mod types;
pub mod upload;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Orchestration code mixes HTTP, filesystem and parsing errors, so it boxes
/// them into a single trait object. The Send + Sync bounds keep the error
/// usable across spawned worker tasks.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Found {} charts to download", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only meant for the command layer: it terminates the process with exit
/// code 1 right after printing.
///
/// # Example
///
/// ```
/// error!("Input file '{}' has no track_id column", path.display());
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
