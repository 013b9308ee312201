//! # Text Extraction
//!
//! PDF parsing is CPU-bound and occasionally hostile, so extraction runs in
//! a blocking task and walks a chain of extractors: the structured `pdf`
//! crate first, `pdf-extract` second, and a lossy printable-byte scavenger
//! last. An empty result is not fatal: the pipeline substitutes a sentinel
//! so analyzers still produce attribution and the page is recorded as
//! failed rather than silently skipped.

use tracing::{info, warn};

use crate::errors::ExtractError;

/// Placeholder fed to analyzers when no extractor produced text.
pub const EMPTY_TEXT_SENTINEL: &str =
    "[No text could be extracted from this document. Record the failure.]";

/// Result of running the extractor chain.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Possibly empty; never the sentinel (the pipeline applies that).
    pub text: String,
    /// Name of the successful extractor, or "none" when all failed.
    pub extractor_used: String,
}

impl ExtractedText {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// The text analyzers should see: the sentinel when extraction failed.
    pub fn analyzer_text(&self) -> &str {
        if self.is_empty() {
            EMPTY_TEXT_SENTINEL
        } else {
            &self.text
        }
    }
}

/// One strategy for pulling text out of a byte stream. Implementations are
/// synchronous; the chain moves them onto the blocking pool.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Ordered chain of extractors; first non-empty success wins.
pub struct ExtractorChain {
    extractors: Vec<std::sync::Arc<dyn Extractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<std::sync::Arc<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    /// The production chain: structured parse, then pdf-extract, then the
    /// scavenger.
    pub fn standard() -> Self {
        Self::new(vec![
            std::sync::Arc::new(PdfOpExtractor),
            std::sync::Arc::new(PdfExtractFallback),
            std::sync::Arc::new(PrintableScavenger),
        ])
    }

    /// Runs the chain. Never fails: exhausting every extractor yields an
    /// empty `ExtractedText` with `extractor_used == "none"`.
    pub async fn extract(&self, bytes: Vec<u8>) -> ExtractedText {
        for extractor in &self.extractors {
            let name = extractor.name();
            let task = {
                let extractor = extractor.clone();
                let data = bytes.clone();
                tokio::task::spawn_blocking(move || extractor.extract(&data))
            };
            let result = match task.await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(extractor = name, "extractor failed: {e}");
                    continue;
                }
                Err(e) => {
                    warn!(extractor = name, "extractor panicked: {e}");
                    continue;
                }
            };
            if !result.trim().is_empty() {
                info!(
                    extractor = name,
                    chars = result.len(),
                    "text extraction succeeded"
                );
                return ExtractedText {
                    text: result,
                    extractor_used: name.to_string(),
                };
            }
            warn!(extractor = name, "extractor returned no text");
        }

        ExtractedText {
            text: String::new(),
            extractor_used: "none".to_string(),
        }
    }
}

/// Primary extractor: structured parse of the document, harvesting the
/// text-drawing operations of each page. A page whose content stream is
/// damaged is skipped instead of sinking the whole document.
pub struct PdfOpExtractor;

impl Extractor for PdfOpExtractor {
    fn name(&self) -> &'static str {
        "pdf-ops"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let document = pdf::file::FileOptions::cached()
            .load(bytes)
            .map_err(parse_error)?;
        let resolver = document.resolver();

        let mut page_texts: Vec<String> = Vec::new();
        for (index, page) in document.pages().enumerate() {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!(page = index, "skipping unreadable page: {e}");
                    continue;
                }
            };
            match page_text(&page, &resolver) {
                Ok(text) if !text.trim().is_empty() => page_texts.push(text),
                Ok(_) => {}
                Err(e) => warn!(page = index, "skipping page with broken content: {e}"),
            }
        }
        Ok(page_texts.join("\n\n"))
    }
}

/// Collects the text fragments drawn by one page's content stream.
fn page_text(
    page: &pdf::object::Page,
    resolver: &impl pdf::object::Resolve,
) -> Result<String, ExtractError> {
    let Some(content) = &page.contents else {
        return Ok(String::new());
    };

    let mut fragments: Vec<String> = Vec::new();
    for op in content.operations(resolver).map_err(parse_error)? {
        match op {
            pdf::content::Op::TextDraw { text } => {
                fragments.push(text.to_string_lossy());
            }
            pdf::content::Op::TextDrawAdjusted { array } => {
                fragments.extend(array.iter().filter_map(|piece| match piece {
                    pdf::content::TextDrawAdjusted::Text(text) => Some(text.to_string_lossy()),
                    _ => None,
                }));
            }
            _ => {}
        }
    }
    Ok(fragments.concat())
}

fn parse_error(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Parse(e.to_string())
}

/// Second chance via the `pdf-extract` crate, which copes with some layouts
/// the structured walk misses.
pub struct PdfExtractFallback;

impl Extractor for PdfExtractFallback {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Parse(e.to_string()))
    }
}

/// Last resort: harvest printable ASCII runs straight from the bytes.
/// Produces noisy text but is better than nothing for lightly damaged
/// files; runs shorter than 4 characters are dropped as framing noise.
pub struct PrintableScavenger;

impl Extractor for PrintableScavenger {
    fn name(&self) -> &'static str {
        "scavenger"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut runs: Vec<String> = Vec::new();
        let mut current = String::new();
        for &b in bytes {
            if (0x20..0x7f).contains(&b) {
                current.push(b as char);
            } else if !current.is_empty() {
                if current.len() >= 4 {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
        if current.len() >= 4 {
            runs.push(current);
        }

        // A valid PDF always contains structural keywords; if that is all
        // we scavenged, report nothing rather than garbage.
        let text = runs
            .into_iter()
            .filter(|run| {
                !run.starts_with('/')
                    && !run.contains("obj")
                    && !run.contains("stream")
                    && run.chars().filter(|c| c.is_alphabetic()).count() * 2 > run.len()
            })
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_yield_empty_result() {
        let chain = ExtractorChain::standard();
        let result = chain.extract(vec![0u8, 1, 2, 3, 0xff, 0xfe]).await;
        assert!(result.is_empty());
        assert_eq!(result.extractor_used, "none");
        assert_eq!(result.analyzer_text(), EMPTY_TEXT_SENTINEL);
    }

    #[tokio::test]
    async fn scavenger_recovers_plain_runs() {
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(b"Quarterly revenue grew substantially this year");
        bytes.extend_from_slice(&[0u8; 8]);

        let result = PrintableScavenger.extract(&bytes).unwrap();
        assert!(result.contains("Quarterly revenue"));
    }

    #[test]
    fn scavenger_drops_structural_noise() {
        let result = PrintableScavenger
            .extract(b"\x00/Type /Page\x00 4 0 obj\x00stream\x00")
            .unwrap();
        assert!(result.trim().is_empty());
    }
}
