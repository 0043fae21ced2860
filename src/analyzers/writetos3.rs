use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::PublishConfig;

/// Body, object key and content type for one report file.
pub struct ReportObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// Builds the S3 object for a local report file, gzip-compressing it when asked.
///
/// Compressed objects get a `.gz` suffix on the key.
pub fn prepare_object(prefix: &str, path: &Path, contents: Vec<u8>, gzip: bool) -> Result<ReportObject> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("report path has no file name: {}", path.display()))?;

    let base_key = if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), file_name)
    };

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&contents)?;
        return Ok(ReportObject {
            key: format!("{base_key}.gz"),
            body: encoder.finish()?,
            content_type: "application/gzip",
        });
    }

    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    };
    Ok(ReportObject {
        key: base_key,
        body: contents,
        content_type,
    })
}

/// Uploads each report file to the configured bucket.
#[tracing::instrument(skip(client, paths), fields(bucket = %publish.bucket, files = paths.len()))]
pub async fn publish_reports(
    client: &aws_sdk_s3::Client,
    publish: &PublishConfig,
    paths: &[PathBuf],
) -> Result<usize> {
    let mut uploaded = 0;

    for path in paths {
        let contents =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let object = prepare_object(&publish.prefix, path, contents, publish.gzip)?;

        client
            .put_object()
            .bucket(&publish.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .content_type(object.content_type)
            .send()
            .await
            .with_context(|| format!("uploading s3://{}/{}", publish.bucket, object.key))?;

        uploaded += 1;
    }

    info!(uploaded, "S3 upload complete");
    Ok(uploaded)
}
