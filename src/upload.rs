//! Copies finished output files to an S3-compatible bucket (Wasabi unless
//! another endpoint is configured).
//!
//! A single file is stored as `<folder>/<file name>`. A directory is walked
//! recursively and every file keeps its path relative to that directory, so
//! uploading `metadata/` into `raw` stores `metadata/tracks/artists.csv` as
//! `raw/tracks/artists.csv`.

use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    Res, config,
    error::{ConfigError, StateError},
};

/// Endpoint and credentials of the target storage.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Settings {
    /// Reads the settings from the environment. `endpoint_url` overrides
    /// `S3_ENDPOINT_URL`.
    pub fn from_env(endpoint_url: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint_url: endpoint_url.unwrap_or_else(config::s3_endpoint_url),
            region: config::s3_region(),
            access_key_id: config::s3_access_key_id()?,
            secret_access_key: config::s3_secret_access_key()?,
        })
    }
}

pub struct UploadOptions {
    pub input: PathBuf,
    pub bucket: String,
    /// Key prefix inside the bucket; empty for the bucket root.
    pub folder: String,
}

#[derive(Debug, Default)]
pub struct UploadSummary {
    pub files: usize,
    pub bytes: u64,
}

/// `<folder>/<relative>` with `/` separators. Leading and trailing slashes of
/// `folder` are ignored.
pub fn object_key(folder: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        relative
    } else {
        format!("{}/{}", folder, relative)
    }
}

/// Every local file below `input` with the key it will be stored under,
/// sorted by path.
pub fn upload_plan(input: &Path, folder: &str) -> Result<Vec<(PathBuf, String)>, StateError> {
    if input.is_file() {
        let name = input.file_name().ok_or_else(|| {
            StateError::CriticalError(format!("'{}' has no file name", input.display()))
        })?;
        return Ok(vec![(input.to_path_buf(), object_key(folder, Path::new(name)))]);
    }

    if !input.is_dir() {
        return Err(StateError::CriticalError(format!(
            "'{}' does not exist",
            input.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(input, &mut files)?;
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let key = match path.strip_prefix(input) {
                Ok(relative) => object_key(folder, relative),
                Err(e) => return Err(StateError::CriticalError(e.to_string())),
            };
            Ok((path, key))
        })
        .collect()
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), StateError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Builds a client for `settings`. Path-style addressing keeps bucket names
/// out of the host name, which S3-compatible providers expect.
pub async fn s3_client(settings: &S3Settings) -> S3Client {
    let credentials = Credentials::new(
        &settings.access_key_id,
        &settings.secret_access_key,
        None,
        None,
        "sporcharts",
    );
    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()))
        .credentials_provider(credentials)
        .load()
        .await;

    let config = aws_sdk_s3::config::Builder::from(&shared)
        .endpoint_url(&settings.endpoint_url)
        .force_path_style(true)
        .build();
    S3Client::from_conf(config)
}

/// Uploads `options.input` one file after the other. Existing objects with
/// the same key are overwritten.
pub async fn upload(options: &UploadOptions, settings: &S3Settings) -> Res<UploadSummary> {
    let plan = upload_plan(&options.input, &options.folder)?;
    let mut summary = UploadSummary::default();
    if plan.is_empty() {
        return Ok(summary);
    }

    let client = s3_client(settings).await;
    let total: u64 = plan
        .iter()
        .map(|(path, _)| fs::metadata(path).map(|m| m.len()).unwrap_or(0))
        .sum();

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.blue} [{bar:30.blue/white}] {bytes}/{total_bytes} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> ").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));

    for (path, key) in &plan {
        pb.set_message(key.clone());
        let size = fs::metadata(path)?.len();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;

        if let Err(e) = client
            .put_object()
            .bucket(&options.bucket)
            .key(key)
            .body(body)
            .send()
            .await
        {
            pb.abandon();
            return Err(format!("uploading '{}' failed: {}", key, DisplayErrorContext(&e)).into());
        }

        summary.files += 1;
        summary.bytes += size;
        pb.inc(size);
    }

    pb.finish_and_clear();
    Ok(summary)
}
