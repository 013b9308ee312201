//! Local download-folder source: every `*.pdf` directly inside the
//! configured directory becomes a candidate document. Content-hash
//! fingerprints only; a local file has no stable external URL to hash.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{DocumentSource, Origin, SourceDocument};
use crate::errors::IngestError;

pub struct LocalFolderSource {
    dir: PathBuf,
}

impl LocalFolderSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DocumentSource for LocalFolderSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn collect(&self) -> Result<Vec<SourceDocument>, IngestError> {
        if !self.dir.is_dir() {
            return Err(IngestError::SourceNotFound(
                self.dir.display().to_string(),
            ));
        }

        let mut documents = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_pdf = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if !path.is_file() || !is_pdf {
                continue;
            }

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!(path = %path.display(), "skipping file with non-UTF-8 name");
                    continue;
                }
            };

            let bytes = tokio::fs::read(&path).await?;
            debug!(file = %filename, size = bytes.len(), "picked up local document");
            documents.push(SourceDocument::from_bytes(&filename, bytes, Origin::Local));
        }

        // Deterministic intake order regardless of directory iteration.
        documents.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_only_pdfs_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_doc.pdf"), b"%PDF-1.4 b").unwrap();
        std::fs::write(dir.path().join("a_doc.pdf"), b"%PDF-1.4 a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a pdf").unwrap();

        let source = LocalFolderSource::new(dir.path());
        let docs = source.collect().await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].display_name, "a doc");
        assert_eq!(docs[1].display_name, "b doc");
        assert!(docs.iter().all(|d| d.raw_bytes.is_some()));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let source = LocalFolderSource::new("/definitely/not/here");
        assert!(matches!(
            source.collect().await,
            Err(IngestError::SourceNotFound(_))
        ));
    }
}
