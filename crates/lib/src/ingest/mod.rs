//! # Document Intake
//!
//! The acquisition stages (cloud drive, local download folder) hand the
//! pipeline `SourceDocument`s: a content fingerprint, a cleaned display
//! name, the origin, and lazily-carried raw bytes. This module defines that
//! contract plus the local-folder source used by the CLI.

pub mod local;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use url::Url;

use crate::errors::IngestError;

pub use local::LocalFolderSource;

/// How a fingerprint is derived. Global and fixed per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintMode {
    /// SHA-256 of the full byte stream; requires downloading the document.
    ContentHash,
    /// SHA-256 of the canonicalized external URL; avoids the download.
    DeepLink,
}

/// Where a document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Drive { url: String },
    Local,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Drive { .. } => "drive",
            Origin::Local => "local",
        }
    }

    pub fn drive_url(&self) -> Option<&str> {
        match self {
            Origin::Drive { url } => Some(url),
            Origin::Local => None,
        }
    }
}

/// One document as produced by an acquisition stage and consumed exactly
/// once by the pipeline.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Hex-encoded SHA-256; the document's primary identity.
    pub fingerprint: String,
    pub origin: Origin,
    pub display_name: String,
    /// Absent when the dedup mode never needed to read the bytes.
    pub raw_bytes: Option<Vec<u8>>,
}

impl SourceDocument {
    /// Builds a document from downloaded bytes (content-hash mode).
    pub fn from_bytes(filename: &str, bytes: Vec<u8>, origin: Origin) -> Self {
        Self {
            fingerprint: fingerprint_bytes(&bytes),
            origin,
            display_name: clean_display_name(filename),
            raw_bytes: Some(bytes),
        }
    }

    /// Builds a drive document fingerprinted by its canonical URL
    /// (deep-link mode). Bytes may be attached later if extraction runs.
    pub fn from_drive_url(filename: &str, url: &str) -> Result<Self, IngestError> {
        Ok(Self {
            fingerprint: fingerprint_url(url)?,
            origin: Origin::Drive {
                url: url.to_string(),
            },
            display_name: clean_display_name(filename),
            raw_bytes: None,
        })
    }

    /// Builds a drive document under the configured dedup mode. Deep-link
    /// mode hashes the canonical URL and works without the byte download;
    /// content-hash mode requires the bytes.
    pub fn from_drive(
        filename: &str,
        url: &str,
        bytes: Option<Vec<u8>>,
        mode: FingerprintMode,
    ) -> Result<Self, IngestError> {
        match mode {
            FingerprintMode::DeepLink => {
                let mut document = Self::from_drive_url(filename, url)?;
                document.raw_bytes = bytes;
                Ok(document)
            }
            FingerprintMode::ContentHash => {
                let bytes = bytes.ok_or_else(|| {
                    IngestError::SourceNotFound(format!(
                        "content-hash dedup requires downloading {url}"
                    ))
                })?;
                Ok(Self::from_bytes(
                    filename,
                    bytes,
                    Origin::Drive {
                        url: url.to_string(),
                    },
                ))
            }
        }
    }
}

/// An acquisition stage. The drive implementation lives outside this crate;
/// the local-folder implementation is in [`local`].
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Stable name for logging ("drive", "local", ...).
    fn name(&self) -> &'static str;

    /// Collects every new document this source can currently see.
    async fn collect(&self) -> Result<Vec<SourceDocument>, IngestError>;
}

/// Hex SHA-256 of a byte stream.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 of a canonicalized URL: lowercase scheme and host, no
/// fragment, no trailing slash. Two links to the same drive file hash
/// identically regardless of how they were shared.
pub fn fingerprint_url(raw: &str) -> Result<String, IngestError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| IngestError::InvalidUrl(e.to_string()))?;
    url.set_fragment(None);
    let mut canonical = url.to_string();
    while canonical.ends_with('/') {
        canonical.pop();
    }
    Ok(fingerprint_bytes(canonical.as_bytes()))
}

/// Cleans a raw filename into a display title: URL-decodes, strips the
/// extension and trailing version suffixes, and normalizes separator
/// punctuation to single spaces.
pub fn clean_display_name(raw: &str) -> String {
    let decoded = percent_decode(raw);
    let stem = decoded
        .rsplit_once('.')
        .map(|(stem, ext)| {
            if ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                stem
            } else {
                decoded.as_str()
            }
        })
        .unwrap_or(decoded.as_str());

    let mut name = stem.replace(['_', '-', '+'], " ");

    // Trailing "(1)", "v2", "final" style suffixes from repeated downloads.
    let version_suffix =
        regex::Regex::new(r"(?i)\s*(\(\d+\)|v\d+(\.\d+)*|final|copy|draft)\s*$").unwrap();
    loop {
        let trimmed = version_suffix.replace(&name, "").to_string();
        if trimmed == name {
            break;
        }
        name = trimmed;
    }

    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "Untitled".to_string()
    } else {
        collapsed
    }
}

/// Minimal percent-decoding for filenames that arrive URL-encoded. Invalid
/// escapes are passed through untouched.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
