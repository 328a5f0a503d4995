use std::path::PathBuf;

use crate::{
    error, info, success,
    upload::{self, S3Settings, UploadOptions},
};

/// Copies a file or a directory of outputs to an S3-compatible bucket.
pub async fn upload(input: PathBuf, bucket: String, folder: String, endpoint_url: Option<String>) {
    let settings = match S3Settings::from_env(endpoint_url) {
        Ok(settings) => settings,
        Err(e) => error!("Cannot configure the S3 client: {}", e),
    };

    let plan = match upload::upload_plan(&input, &folder) {
        Ok(plan) => plan,
        Err(e) => error!("Cannot list files to upload: {}", e),
    };
    if plan.is_empty() {
        success!("'{}' holds no files to upload", input.display());
        return;
    }

    let destination = if folder.trim_matches('/').is_empty() {
        format!("the root of bucket '{}'", bucket)
    } else {
        format!("'{}' in bucket '{}'", folder.trim_matches('/'), bucket)
    };
    info!(
        "Uploading {} file(s) from '{}' to {} at {}",
        plan.len(),
        input.display(),
        destination,
        settings.endpoint_url
    );

    let options = UploadOptions {
        input,
        bucket,
        folder,
    };
    match upload::upload(&options, &settings).await {
        Ok(summary) => success!("Uploaded {} file(s), {} bytes", summary.files, summary.bytes),
        Err(e) => error!("Upload failed: {}", e),
    }
}
