use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, de::DeserializeOwned};

use crate::{error::StateError, types::ResponseRecord, warning};

/// Statuses that will never succeed for the same ID.
pub const PERMANENT_STATUSES: [u16; 2] = [403, 404];

#[derive(Deserialize)]
struct TrackIdLine {
    track_id: String,
}

/// Resume state of one internal-endpoint harvest: the success log and the
/// error log written next to it.
pub struct StateManager {
    output: PathBuf,
    error_log: PathBuf,
}

impl StateManager {
    pub fn new(output: PathBuf, error_log: PathBuf) -> Self {
        Self { output, error_log }
    }

    /// `foo.jsonl` pairs with `foo_errors.jsonl`.
    pub fn for_output(output: &Path) -> Self {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let error_log = output.with_file_name(format!("{}_errors.jsonl", stem));
        Self::new(output.to_path_buf(), error_log)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn error_log(&self) -> &Path {
        &self.error_log
    }

    pub async fn existing_track_ids(&self) -> Result<HashSet<String>, StateError> {
        existing_track_ids(&self.output).await
    }

    pub async fn load_error_log(&self) -> Result<Vec<ResponseRecord>, StateError> {
        read_jsonl(&self.error_log).await
    }

    /// Drops IDs that already have a response or a permanent error.
    pub async fn pending(&self, ids: Vec<String>) -> Result<Vec<String>, StateError> {
        let done = self.existing_track_ids().await?;
        let errors = self.load_error_log().await?;
        let permanent: HashSet<u16> = PERMANENT_STATUSES.into_iter().collect();
        let skip = error_ids_to_skip(
            errors.iter().map(|r| (r.track_id.as_str(), r.status_code)),
            &permanent,
        );

        Ok(ids
            .into_iter()
            .filter(|id| !done.contains(id) && !skip.contains(id))
            .collect())
    }
}

/// Reads a JSON-lines file. A missing file is empty; lines that do not parse
/// (usually a line cut short by an interrupted run) are skipped with a
/// warning.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StateError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = async_fs::read_to_string(path).await?;
    let mut values = Vec::new();
    let mut skipped = 0;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(value) => values.push(value),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        warning!(
            "Skipped {} unreadable line(s) in '{}'",
            skipped,
            path.display()
        );
    }
    Ok(values)
}

/// Track IDs that already have a line in a response log.
pub async fn existing_track_ids(path: &Path) -> Result<HashSet<String>, StateError> {
    let lines: Vec<TrackIdLine> = read_jsonl(path).await?;
    Ok(lines.into_iter().map(|l| l.track_id).collect())
}

/// IDs with at least one logged error whose status is in `statuses`.
pub fn error_ids_to_skip<I, S>(errors: I, statuses: &HashSet<u16>) -> HashSet<String>
where
    I: IntoIterator<Item = (S, u16)>,
    S: AsRef<str>,
{
    errors
        .into_iter()
        .filter(|(_, status)| statuses.contains(status))
        .map(|(id, _)| id.as_ref().to_string())
        .collect()
}

/// File names present in a download directory. A missing directory is empty.
pub fn already_downloaded(dir: &Path) -> Result<HashSet<String>, StateError> {
    if !dir.is_dir() {
        return Ok(HashSet::new());
    }

    let mut names = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(names)
}

/// Deletes `*.part` files left behind by interrupted downloads and returns
/// how many were removed.
pub fn remove_incomplete_downloads(dir: &Path) -> Result<usize, StateError> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "part") {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
