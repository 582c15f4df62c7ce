//! Binary media downloads
//!
//! A media task URL may point straight at a file, or at an HTML page that
//! embeds files of the declared kind. Files are streamed to disk and hashed
//! while writing; nothing is held fully in memory.
//!
//! The page request itself is admitted by the orchestrator. Each embedded
//! file is a request of its own and goes through the rate limiter first.

use crate::adapters::{
    classify_reqwest_error, extract_media_urls, mime_essence, Adapter, AdapterKind, FetchError,
    FetchErrorKind, FetchRequest, MediaFile, Payload,
};
use crate::limiter::{AcquireError, DomainRateLimiter};
use crate::plan::DataKind;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use url::Url;

/// Extensions accepted for `application/octet-stream` responses, by kind
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "flac", "m4a", "aac", "opus"];

/// Downloads images, video and audio to a local directory
pub struct MediaAdapter {
    client: Client,
    media_dir: PathBuf,
    max_bytes: u64,
    max_per_page: usize,
    limiter: Option<Arc<DomainRateLimiter>>,
}

impl MediaAdapter {
    /// Creates a media adapter
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client
    /// * `media_dir` - Directory files are written to (created on demand)
    /// * `max_bytes` - Per-file size ceiling
    /// * `max_per_page` - Cap on files downloaded from one embedding page
    pub fn new(client: Client, media_dir: PathBuf, max_bytes: u64, max_per_page: usize) -> Self {
        Self {
            client,
            media_dir,
            max_bytes,
            max_per_page,
            limiter: None,
        }
    }

    /// Admits every embedded download through `limiter`
    pub fn with_limiter(mut self, limiter: Arc<DomainRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Takes a rate-limit token for one embedded file
    ///
    /// Disallowed files are skipped. Not getting a token before the task's
    /// deadline ends the page.
    async fn admit(&self, url: &Url, remaining: Duration) -> Admission {
        let Some(limiter) = &self.limiter else {
            return Admission::Go;
        };
        match limiter.acquire_within(url, remaining).await {
            Ok(_) => Admission::Go,
            Err(AcquireError::Disallowed { .. }) => Admission::Skip(FetchError::new(
                FetchErrorKind::Disallowed,
                format!("{} is disallowed by crawl directives", url),
            )),
            Err(AcquireError::NoDomain(url)) => Admission::Skip(FetchError::new(
                FetchErrorKind::Navigation,
                format!("URL has no host: {}", url),
            )),
            Err(e @ AcquireError::WaitExceeded { .. }) => {
                Admission::Stop(FetchError::new(FetchErrorKind::RateLimitWait, e.to_string()))
            }
        }
    }

    /// Downloads every embedded file of `kind` from an HTML page
    async fn fetch_embedded(
        &self,
        page_url: &Url,
        html: &str,
        kind: DataKind,
        deadline: Instant,
    ) -> Result<Vec<MediaFile>, FetchError> {
        let urls = extract_media_urls(html, page_url, kind);
        if urls.is_empty() {
            return Err(FetchError::new(
                FetchErrorKind::UnsupportedMediaType,
                format!("{} is an HTML page with no embedded {} media", page_url, kind),
            ));
        }

        let mut files = Vec::new();
        let mut last_error = None;

        for media_url in urls.into_iter().take(self.max_per_page) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_error = Some(FetchError::new(
                    FetchErrorKind::Timeout,
                    format!("time budget spent after {} files from {}", files.len(), page_url),
                ));
                break;
            }

            match self.admit(&media_url, remaining).await {
                Admission::Go => {}
                Admission::Skip(e) => {
                    tracing::debug!("Skipping embedded media {}: {}", media_url, e);
                    last_error = Some(e);
                    continue;
                }
                Admission::Stop(e) => {
                    tracing::debug!("No token for embedded media {}: {}", media_url, e);
                    last_error = Some(e);
                    break;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.download(&media_url, kind, remaining).await {
                Ok(file) => files.push(file),
                Err(e) => {
                    tracing::debug!("Skipping embedded media {}: {}", media_url, e);
                    last_error = Some(e);
                }
            }
        }

        if files.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                FetchError::new(FetchErrorKind::MediaDownload, "no media downloaded")
            }));
        }

        Ok(files)
    }

    /// Downloads one media file
    async fn download(
        &self,
        url: &Url,
        kind: DataKind,
        timeout: Duration,
    ) -> Result<MediaFile, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::http(status.as_u16(), url));
        }

        self.save_response(url, response, kind).await
    }

    /// Verifies a media response against the declared kind and writes it to
    /// the media directory
    async fn save_response(
        &self,
        url: &Url,
        response: reqwest::Response,
        kind: DataKind,
    ) -> Result<MediaFile, FetchError> {
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(mime_essence)
            .unwrap_or_default();

        if !mime_matches_kind(&mime_type, url, kind) {
            return Err(FetchError::new(
                FetchErrorKind::UnsupportedMediaType,
                format!("{} served '{}', expected {}", url, mime_type, kind),
            ));
        }

        let expected_len = response.content_length();
        if let Some(len) = expected_len {
            if len > self.max_bytes {
                return Err(FetchError::new(
                    FetchErrorKind::MediaDownload,
                    format!("{} is {} bytes, limit is {}", url, len, self.max_bytes),
                ));
            }
        }

        let disposition_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition);

        fs::create_dir_all(&self.media_dir).await.map_err(|e| {
            FetchError::new(
                FetchErrorKind::MediaDownload,
                format!("cannot create {}: {}", self.media_dir.display(), e),
            )
        })?;

        let part_path = self.media_dir.join(format!(
            ".{}.part",
            hex::encode(Sha256::digest(url.as_str().as_bytes()))
        ));

        let part = PartFile::new(part_path);
        let (size, sha256) = self
            .stream_to_file(response, part.path(), expected_len)
            .await?;

        let base_name = disposition_name
            .or_else(|| filename_from_url(url))
            .unwrap_or_else(|| format!("{}{}", kind, extension_for_mime(&mime_type)));
        let file_name = format!("{}_{}", &sha256[..12], sanitize_filename(&base_name));
        let path = self.media_dir.join(file_name);

        fs::rename(part.path(), &path).await.map_err(|e| {
            FetchError::new(
                FetchErrorKind::MediaDownload,
                format!("cannot move download into place: {}", e),
            )
        })?;
        part.keep();

        tracing::debug!("Downloaded {} ({} bytes) to {}", url, size, path.display());

        Ok(MediaFile {
            path,
            source_url: url.to_string(),
            size,
            mime_type,
            sha256,
        })
    }

    /// Streams a response body to `path`, returning its size and SHA-256
    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        path: &Path,
        expected_len: Option<u64>,
    ) -> Result<(u64, String), FetchError> {
        let io_error = |e: std::io::Error| {
            FetchError::new(
                FetchErrorKind::MediaDownload,
                format!("write to {} failed: {}", path.display(), e),
            )
        };

        let mut file = fs::File::create(path).await.map_err(io_error)?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest_error(&e))?;
            size += chunk.len() as u64;
            if size > self.max_bytes {
                return Err(FetchError::new(
                    FetchErrorKind::MediaDownload,
                    format!("body exceeds limit of {} bytes", self.max_bytes),
                ));
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(io_error)?;
        }

        file.flush().await.map_err(io_error)?;

        if let Some(expected) = expected_len {
            if expected != size {
                return Err(FetchError::new(
                    FetchErrorKind::MediaDownload,
                    format!("Content-Length was {} but received {} bytes", expected, size),
                ));
            }
        }

        Ok((size, hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl Adapter for MediaAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Media
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        let deadline = Instant::now() + request.timeout;

        let response = self
            .client
            .get(request.url.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::http(status.as_u16(), &request.url));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| mime_essence(ct) == "text/html")
            .unwrap_or(false);

        let files = if is_html && request.kind.is_media() {
            let page_url = response.url().clone();
            let html = response
                .text()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;
            self.fetch_embedded(&page_url, &html, request.kind, deadline)
                .await?
        } else {
            vec![
                self.save_response(&request.url, response, request.kind)
                    .await?,
            ]
        };

        Ok(Payload::Media { files })
    }
}

enum Admission {
    Go,
    Skip(FetchError),
    Stop(FetchError),
}

/// A partially written download, removed on drop unless kept
///
/// Covers every way a download can end early, including the fetch future
/// being dropped by an outer timeout.
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file was moved into place; nothing to clean up
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Returns whether a served MIME type is acceptable for the declared kind
///
/// Text tasks routed here accept anything. `application/octet-stream` and a
/// missing type fall back to the URL's file extension.
fn mime_matches_kind(mime_type: &str, url: &Url, kind: DataKind) -> bool {
    let Some(prefix) = kind.mime_prefix() else {
        return true;
    };

    if mime_type.starts_with(prefix) {
        return true;
    }

    if mime_type.is_empty() || mime_type == "application/octet-stream" {
        let extensions = match kind {
            DataKind::Image => IMAGE_EXTENSIONS,
            DataKind::Video => VIDEO_EXTENSIONS,
            DataKind::Audio => AUDIO_EXTENSIONS,
            DataKind::Text => return true,
        };
        return url_extension(url)
            .map(|ext| extensions.contains(&ext.as_str()))
            .unwrap_or(false);
    }

    false
}

/// Lowercased extension of the URL's last path segment
fn url_extension(url: &Url) -> Option<String> {
    let name = url.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Extracts `filename=` from a Content-Disposition header
fn filename_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Uses the URL's last path segment as a file name when it has an extension
fn filename_from_url(url: &Url) -> Option<String> {
    let name = url.path_segments()?.next_back()?;
    if name.contains('.') {
        Some(name.to_string())
    } else {
        None
    }
}

/// Guesses a file extension (with leading dot) for a MIME type
fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".ogg",
        "audio/wav" | "audio/x-wav" => ".wav",
        "audio/flac" => ".flac",
        "text/plain" => ".txt",
        _ => ".bin",
    }
}

/// Replaces characters that are unsafe in file names
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}
