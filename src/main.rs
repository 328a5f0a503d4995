use std::path::PathBuf;

use clap::{
    ArgAction, CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use sporcharts::{cli, config, error, internal::Resource, output::FileFormat};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download and combine daily regional charts
    #[command(subcommand)]
    Charts(ChartsCommand),

    /// Fetch track, album and artist metadata from the Web API
    #[command(subcommand)]
    Metadata(MetadataCommand),

    /// Fetch credits or lyrics from the internal API
    #[command(subcommand)]
    Internal(InternalCommand),

    /// Show the state of a download directory or response log
    Info(InfoOptions),

    /// Copy a file or directory to an S3-compatible bucket
    Upload(UploadOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ChartsCommand {
    /// Download one CSV per region and day
    Download(DownloadOptions),

    /// Merge downloaded charts into one dataset
    Combine(CombineOptions),
}

#[derive(Parser, Debug, Clone)]
pub struct DownloadOptions {
    /// First chart date (YYYY-MM-DD), defaults to 2017-01-01
    #[clap(long)]
    pub start: Option<String>,

    /// Last chart date (YYYY-MM-DD), defaults to today
    #[clap(long)]
    pub end: Option<String>,

    /// Region codes: a CSV file with a `code` column, a text file with one
    /// code per line, or a comma separated list
    #[clap(long)]
    pub regions: String,

    #[clap(long, default_value = "charts")]
    pub output_dir: PathBuf,

    #[clap(long, default_value_t = 8)]
    pub workers: usize,

    /// JSON file with captured request headers (instead of SPOTIFY_CHARTS_TOKEN)
    #[clap(long)]
    pub headers: Option<PathBuf>,

    #[clap(long, default_value_t = 5)]
    pub max_attempts: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct CombineOptions {
    #[clap(long, default_value = "charts")]
    pub input_dir: PathBuf,

    /// `.csv` or `.parquet`
    #[clap(long, default_value = "charts.csv")]
    pub output: PathBuf,

    /// Drop charts before this date (YYYY-MM-DD)
    #[clap(long)]
    pub start: Option<String>,

    /// Drop charts after this date (YYYY-MM-DD)
    #[clap(long)]
    pub end: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MetadataCommand {
    /// Track metadata for the `track_id` column of a CSV or Parquet file
    Tracks(MetadataOptions),

    /// Album metadata for the `album_id` column of a CSV or Parquet file
    Albums(MetadataOptions),

    /// Artist metadata for the `artist_id` column of one or more CSV or Parquet files
    Artists(ArtistsOptions),

    /// Tracks, then their albums, then all their artists
    All(MetadataOptions),
}

#[derive(Parser, Debug, Clone)]
pub struct MetadataOptions {
    #[clap(long)]
    pub input: PathBuf,

    #[clap(long, default_value = "metadata")]
    pub output_dir: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct ArtistsOptions {
    /// Can be repeated
    #[clap(long, action = ArgAction::Append, num_args = 1, required = true)]
    pub input: Vec<PathBuf>,

    #[clap(long, default_value = "metadata")]
    pub output_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum InternalCommand {
    /// Fetch raw responses for the `track_id` column of a CSV or Parquet file
    Fetch(FetchOptions),

    /// Flatten a credits response log into Parquet or CSV tables
    Credits(CreditsOptions),
}

#[derive(Parser, Debug, Clone)]
pub struct FetchOptions {
    #[clap(long, value_enum)]
    pub resource: Resource,

    #[clap(long)]
    pub input: PathBuf,

    /// Defaults to `<resource>.jsonl`
    #[clap(long)]
    pub output: Option<PathBuf>,

    /// JSON file with request headers captured from the web player
    #[clap(long)]
    pub headers: PathBuf,

    /// CSV or Parquet file with `track_id` and `market` columns; only tracks
    /// available in the current market are fetched
    #[clap(long)]
    pub markets: Option<PathBuf>,

    /// Parallel requests, defaults to 100 for credits and 50 for lyrics
    #[clap(long)]
    pub parallel: Option<usize>,

    #[clap(long, default_value_t = 5)]
    pub max_attempts: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct CreditsOptions {
    #[clap(long, default_value = "credits.jsonl")]
    pub input: PathBuf,

    #[clap(long, default_value = "credits")]
    pub output_dir: PathBuf,

    #[clap(long, value_enum, default_value_t = FileFormat::Parquet)]
    pub format: FileFormat,
}

#[derive(Parser, Debug, Clone)]
pub struct InfoOptions {
    #[clap(long)]
    charts_dir: Option<PathBuf>,
    #[clap(long)]
    jsonl: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct UploadOptions {
    /// File or directory; directories are uploaded recursively
    #[clap(short, long)]
    pub input: PathBuf,

    #[clap(short, long)]
    pub bucket: String,

    /// Folder inside the bucket, empty for the bucket root
    #[clap(short, long, default_value = "")]
    pub folder: String,

    /// Defaults to S3_ENDPOINT_URL or the Wasabi eu-central-2 endpoint
    #[clap(short, long)]
    pub endpoint_url: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Charts(command) => match command {
            ChartsCommand::Download(opt) => {
                cli::download_charts(
                    opt.start,
                    opt.end,
                    opt.regions,
                    opt.output_dir,
                    opt.workers,
                    opt.headers,
                    opt.max_attempts,
                )
                .await
            }
            ChartsCommand::Combine(opt) => {
                cli::combine_charts(opt.input_dir, opt.output, opt.start, opt.end).await
            }
        },

        Command::Metadata(command) => match command {
            MetadataCommand::Tracks(opt) => cli::track_metadata(opt.input, opt.output_dir).await,
            MetadataCommand::Albums(opt) => cli::album_metadata(opt.input, opt.output_dir).await,
            MetadataCommand::Artists(opt) => cli::artist_metadata(opt.input, opt.output_dir).await,
            MetadataCommand::All(opt) => cli::all_metadata(opt.input, opt.output_dir).await,
        },

        Command::Internal(command) => match command {
            InternalCommand::Fetch(opt) => {
                cli::fetch_internal(
                    opt.resource,
                    opt.input,
                    opt.output,
                    opt.headers,
                    opt.markets,
                    opt.parallel,
                    opt.max_attempts,
                )
                .await
            }
            InternalCommand::Credits(opt) => {
                cli::process_credits(opt.input, opt.output_dir, opt.format).await
            }
        },

        Command::Info(opt) => cli::info(opt.charts_dir, opt.jsonl).await,
        Command::Upload(opt) => {
            cli::upload(opt.input, opt.bucket, opt.folder, opt.endpoint_url).await
        }
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
