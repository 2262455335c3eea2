//! Content type detection and the inline/attachment decision for downloads.

use std::path::Path;
use tokio::io::AsyncReadExt;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const ZIP: &str = "application/zip";

/// How many leading bytes are inspected for magic numbers.
const SNIFF_LEN: u64 = 8192;

/// How a browser should present a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    /// PDFs and images are shown inline unless the caller asked for a
    /// download. Everything else is an attachment.
    pub fn for_content(content_type: &str, force_download: bool) -> Self {
        if !force_download && (content_type == "application/pdf" || content_type.starts_with("image/")) {
            Disposition::Inline
        } else {
            Disposition::Attachment
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Detects a content type from magic bytes first and the file name second.
pub fn detect(head: &[u8], name: &str) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_owned();
    }
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.essence_str().to_owned())
        .unwrap_or_else(|| OCTET_STREAM.to_owned())
}

/// Reads the head of `path` and detects its content type.
///
/// Detection is best effort: a read failure falls back to the name alone.
pub async fn sniff(path: &Path, name: &str) -> String {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    match tokio::fs::File::open(path).await {
        Ok(file) => {
            if let Err(err) = file.take(SNIFF_LEN).read_to_end(&mut head).await {
                tracing::debug!(name, "content sniffing failed: {err}");
                head.clear();
            }
        }
        Err(err) => tracing::debug!(name, "content sniffing failed: {err}"),
    }
    detect(&head, name)
}
