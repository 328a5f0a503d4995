//! # CLI Module
//!
//! Command implementations behind the `sporcharts` binary. Each function
//! parses nothing itself: `main.rs` owns the clap definitions and passes the
//! parsed values in.
//!
//! ## Commands
//!
//! ### Charts
//! - [`download_charts`] - Download daily regional charts into a directory
//! - [`combine_charts`] - Merge a download directory into one dataset
//!
//! ### Metadata
//! - [`track_metadata`], [`album_metadata`], [`artist_metadata`] - Web API
//!   metadata for one entity
//! - [`all_metadata`] - Tracks, then albums, then artists
//!
//! ### Internal API
//! - [`fetch_internal`] - Credits or lyrics responses for track IDs
//! - [`process_credits`] - Flatten credits responses into Parquet or CSV tables
//!
//! ### Info
//! - [`info`] - Status of a download directory or response log
//!
//! ### Storage
//! - [`upload`] - Copy outputs to an S3-compatible bucket
//!
//! ## Error Handling
//!
//! Commands report failures with the `error!` macro, which prints the message
//! and exits with status 1. Problems that do not stop the command are
//! reported with `warning!`.

mod charts;
mod info;
mod internal;
mod metadata;
mod upload;

pub use charts::combine as combine_charts;
pub use charts::download as download_charts;
pub use info::info;
pub use internal::credits as process_credits;
pub use internal::fetch as fetch_internal;
pub use metadata::albums as album_metadata;
pub use metadata::all as all_metadata;
pub use metadata::artists as artist_metadata;
pub use metadata::tracks as track_metadata;
pub use upload::upload;
