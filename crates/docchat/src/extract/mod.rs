//! Document text extraction
//!
//! PDFs go through `pdf-extract` on the blocking pool; plain-text uploads are
//! decoded as UTF-8. Anything else is rejected.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ExtractionError;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown"];

/// Turns an uploaded document into plain text
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract the text of `bytes`, using `filename` only as a type hint
    async fn extract(&self, filename: &str, bytes: Bytes) -> Result<String, ExtractionError>;
}

/// Detected document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
    Unknown,
}

impl DocumentKind {
    /// Sniff the format from content first, then the filename extension
    pub fn detect(filename: &str, bytes: &[u8]) -> Self {
        if bytes.starts_with(b"%PDF") {
            return DocumentKind::Pdf;
        }

        match extension(filename).as_deref() {
            Some("pdf") => DocumentKind::Pdf,
            Some(ext) if TEXT_EXTENSIONS.contains(&ext) => DocumentKind::Text,
            Some(_) => DocumentKind::Unknown,
            None if looks_like_text(bytes) => DocumentKind::Text,
            None => DocumentKind::Unknown,
        }
    }
}

fn extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

/// Extractor handling PDF and plain-text documents
#[derive(Debug, Clone, Default)]
pub struct DefaultExtractor;

impl DefaultExtractor {
    pub fn new() -> Self {
        Self
    }

    async fn extract_pdf(bytes: Bytes) -> Result<String, ExtractionError> {
        // pdf-extract is synchronous and may panic on malformed input
        let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Unreadable {
                kind: "PDF",
                reason: if e.is_panic() {
                    "parser crashed on malformed document".to_string()
                } else {
                    e.to_string()
                },
            })?;

        result.map_err(|e| ExtractionError::Unreadable {
            kind: "PDF",
            reason: e.to_string(),
        })
    }

    fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| ExtractionError::Unreadable {
            kind: "text",
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl DocumentExtractor for DefaultExtractor {
    async fn extract(&self, filename: &str, bytes: Bytes) -> Result<String, ExtractionError> {
        let kind = DocumentKind::detect(filename, &bytes);
        tracing::debug!(filename, ?kind, size = bytes.len(), "Extracting document");

        let text = match kind {
            DocumentKind::Pdf => Self::extract_pdf(bytes).await?,
            DocumentKind::Text => Self::extract_text(&bytes)?,
            DocumentKind::Unknown => {
                return Err(ExtractionError::Unsupported(
                    extension(filename).unwrap_or_else(|| "binary".to_string()),
                ));
            }
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME_PDF: &[u8] = include_bytes!("../../tests/fixtures/resume.pdf");

    fn squash(text: &str) -> String {
        text.split_whitespace().collect()
    }

    #[test]
    fn test_detect_by_magic_bytes() {
        assert_eq!(
            DocumentKind::detect("upload.bin", b"%PDF-1.7\n..."),
            DocumentKind::Pdf
        );
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(DocumentKind::detect("CV.PDF", b"junk"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::detect("notes.md", b"# hi"), DocumentKind::Text);
        assert_eq!(DocumentKind::detect("resume.txt", b"hi"), DocumentKind::Text);
        assert_eq!(
            DocumentKind::detect("resume.docx", b"PK\x03\x04"),
            DocumentKind::Unknown
        );
    }

    #[test]
    fn test_detect_without_extension() {
        assert_eq!(DocumentKind::detect("resume", b"plain words"), DocumentKind::Text);
        assert_eq!(
            DocumentKind::detect("resume", &[0x00, 0x9f, 0x92]),
            DocumentKind::Unknown
        );
    }

    #[tokio::test]
    async fn test_extract_plain_text() {
        let text = DefaultExtractor::new()
            .extract("cv.txt", Bytes::from_static(b"Jane Doe\nRust engineer\n"))
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe\nRust engineer\n");
    }

    #[tokio::test]
    async fn test_extract_blank_text_is_empty_error() {
        let result = DefaultExtractor::new()
            .extract("cv.txt", Bytes::from_static(b"  \n\t "))
            .await;
        assert_eq!(result, Err(ExtractionError::Empty));
    }

    #[tokio::test]
    async fn test_extract_invalid_utf8_text() {
        let result = DefaultExtractor::new()
            .extract("cv.txt", Bytes::from_static(&[0xff, 0xfe, 0x41]))
            .await;
        assert!(matches!(
            result,
            Err(ExtractionError::Unreadable { kind: "text", .. })
        ));
    }

    #[tokio::test]
    async fn test_extract_unsupported_type() {
        let result = DefaultExtractor::new()
            .extract("resume.docx", Bytes::from_static(b"PK\x03\x04"))
            .await;
        assert_eq!(result, Err(ExtractionError::Unsupported("docx".to_string())));
    }

    #[tokio::test]
    async fn test_extract_corrupt_pdf_is_error_not_panic() {
        let result = DefaultExtractor::new()
            .extract("cv.pdf", Bytes::from_static(b"%PDF-1.4\nthis is not really a pdf"))
            .await;
        assert!(matches!(
            result,
            Err(ExtractionError::Unreadable { kind: "PDF", .. })
        ));
    }

    #[tokio::test]
    async fn test_extract_single_page_pdf() {
        let text = DefaultExtractor::new()
            .extract("resume.pdf", Bytes::from_static(RESUME_PDF))
            .await
            .unwrap();

        // Layout whitespace depends on the parser; the words do not
        let words = squash(&text);
        assert!(words.contains("JaneDoe"), "got {text:?}");
        assert!(words.contains("SeniorRustEngineer"), "got {text:?}");
    }
}
