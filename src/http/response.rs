//! Response handling and transformation.
//!
//! # Responsibilities
//! - Transform backend response headers for the client
//! - Remove backend identity and hop-by-hop headers
//! - Decide `Content-Disposition` from the attachment's extension
//! - Fill in `Content-Type` when the backend omitted it
//!
//! # Design Decisions
//! - Classification is a static table; configuration may override entries
//! - Unknown extensions fall back to the configured default (`attachment`)
//! - Status codes are never rewritten here; error mapping happens upstream

use std::collections::HashMap;

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::DispositionConfig;
use crate::security::headers::HeaderPolicy;
use crate::security::ValidatedIdentifiers;

/// How the client should present a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

use Disposition::{Attachment, Inline};

/// Fallback content type when neither backend nor table knows better.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension → (disposition, content type).
static FILE_TYPES: &[(&str, Disposition, &str)] = &[
    // Documents
    ("pdf", Inline, "application/pdf"),
    ("txt", Inline, "text/plain; charset=utf-8"),
    ("csv", Inline, "text/csv"),
    ("json", Inline, "application/json"),
    ("xml", Inline, "application/xml"),
    ("md", Inline, "text/markdown"),
    ("rtf", Inline, "application/rtf"),
    ("doc", Inline, "application/msword"),
    ("docx", Inline, "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", Inline, "application/vnd.ms-excel"),
    ("xlsx", Inline, "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", Inline, "application/vnd.ms-powerpoint"),
    ("pptx", Inline, "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("odt", Inline, "application/vnd.oasis.opendocument.text"),
    ("ods", Inline, "application/vnd.oasis.opendocument.spreadsheet"),
    ("odp", Inline, "application/vnd.oasis.opendocument.presentation"),
    // Images
    ("jpg", Inline, "image/jpeg"),
    ("jpeg", Inline, "image/jpeg"),
    ("png", Inline, "image/png"),
    ("gif", Inline, "image/gif"),
    ("webp", Inline, "image/webp"),
    ("bmp", Inline, "image/bmp"),
    ("tif", Inline, "image/tiff"),
    ("tiff", Inline, "image/tiff"),
    ("ico", Inline, "image/x-icon"),
    ("avif", Inline, "image/avif"),
    ("heic", Inline, "image/heic"),
    // Media
    ("mp3", Inline, "audio/mpeg"),
    ("wav", Inline, "audio/wav"),
    ("mp4", Inline, "video/mp4"),
    ("webm", Inline, "video/webm"),
    // Archives
    ("zip", Attachment, "application/zip"),
    ("tar", Attachment, "application/x-tar"),
    ("gz", Attachment, "application/gzip"),
    ("tgz", Attachment, "application/gzip"),
    ("bz2", Attachment, "application/x-bzip2"),
    ("xz", Attachment, "application/x-xz"),
    ("7z", Attachment, "application/x-7z-compressed"),
    ("rar", Attachment, "application/vnd.rar"),
    ("zst", Attachment, "application/zstd"),
    // Active content is never rendered on our origin
    ("html", Attachment, "text/html"),
    ("htm", Attachment, "text/html"),
    ("svg", Attachment, "image/svg+xml"),
    ("js", Attachment, "text/javascript"),
    ("exe", Attachment, "application/octet-stream"),
    ("bin", Attachment, "application/octet-stream"),
];

/// Lowercased extension after the last dot, if any.
pub fn extension_of(attachment_id: &str) -> Option<String> {
    match attachment_id.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

fn lookup(ext: &str) -> Option<(Disposition, &'static str)> {
    FILE_TYPES
        .iter()
        .find(|(known, _, _)| *known == ext)
        .map(|(_, disposition, content_type)| (*disposition, *content_type))
}

/// Content type for an attachment name, from the static table.
pub fn content_type_for(attachment_id: &str) -> &'static str {
    extension_of(attachment_id)
        .and_then(|ext| lookup(&ext))
        .map(|(_, content_type)| content_type)
        .unwrap_or(OCTET_STREAM)
}

/// Rewrites backend response headers into the client-facing set.
#[derive(Debug, Clone)]
pub struct ResponseTransformer {
    policy: HeaderPolicy,
    overrides: HashMap<String, Disposition>,
    default: Disposition,
    include_filename: bool,
}

impl ResponseTransformer {
    pub fn new(policy: HeaderPolicy, config: &DispositionConfig) -> Self {
        Self {
            policy,
            overrides: config.overrides.clone(),
            default: config.default,
            include_filename: config.include_filename,
        }
    }

    /// Disposition for an attachment name: overrides, then table, then default.
    pub fn disposition_for(&self, attachment_id: &str) -> Disposition {
        let Some(ext) = extension_of(attachment_id) else {
            return self.default;
        };
        self.overrides
            .get(&ext)
            .copied()
            .or_else(|| lookup(&ext).map(|(disposition, _)| disposition))
            .unwrap_or(self.default)
    }

    fn disposition_header(&self, attachment_id: &str) -> HeaderValue {
        let disposition = self.disposition_for(attachment_id);
        if self.include_filename {
            // Validated identifiers contain no quotes or control characters.
            let value = format!("{}; filename=\"{}\"", disposition.as_str(), attachment_id);
            HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static(disposition.as_str()))
        } else {
            HeaderValue::from_static(disposition.as_str())
        }
    }

    /// Produce the client-facing headers for a forwarded backend response.
    pub fn transform(
        &self,
        status: StatusCode,
        mut headers: HeaderMap,
        ids: &ValidatedIdentifiers,
    ) -> HeaderMap {
        self.policy.sanitize(&mut headers);

        if status.is_success() {
            let attachment_id = ids.attachment_id();
            headers.insert(header::CONTENT_DISPOSITION, self.disposition_header(attachment_id));

            if !headers.contains_key(header::CONTENT_TYPE) && status != StatusCode::NO_CONTENT {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type_for(attachment_id)),
                );
            }
        }

        headers
    }
}
