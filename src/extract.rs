//! Text extraction for document payloads.
//!
//! Turns raw bytes into plain UTF-8 text, bounded by size and page
//! ceilings. The byte ceiling is a hard limit checked before any parsing;
//! the page ceiling truncates — the first N pages are processed and the
//! truncation is logged, never treated as a failure.
//!
//! Extraction is purely in-memory: no temp files are written.

use tracing::warn;

use crate::error::{RagError, Result};

/// Supported MIME types.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Size and page ceilings applied during extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    /// Hard ceiling on input bytes; larger payloads are rejected unparsed.
    pub max_bytes: usize,
    /// Pages beyond this are dropped with a logged warning.
    pub max_pages: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            max_pages: 500,
        }
    }
}

/// Extract plain text from a document payload.
///
/// Fails with [`RagError::Extraction`] for oversized payloads, unsupported
/// content types, and unparseable bytes. Documents over the page ceiling
/// are truncated, not rejected.
pub fn extract_text(bytes: &[u8], content_type: &str, limits: ExtractLimits) -> Result<String> {
    if bytes.len() > limits.max_bytes {
        return Err(RagError::Extraction(format!(
            "document too large: {} bytes (max {})",
            bytes.len(),
            limits.max_bytes
        )));
    }

    match content_type {
        MIME_PDF => extract_pdf(bytes, limits.max_pages),
        MIME_TEXT => std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| RagError::Extraction("text payload is not valid UTF-8".to_string())),
        other => Err(RagError::Extraction(format!(
            "unsupported content type: {}",
            other
        ))),
    }
}

fn extract_pdf(bytes: &[u8], max_pages: usize) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::Extraction(format!("PDF parse failed: {}", e)))?;

    let pages = doc.get_pages();
    let total_pages = pages.len();
    if total_pages == 0 {
        return Err(RagError::Extraction("PDF has no pages".to_string()));
    }

    if total_pages <= max_pages {
        return pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {}", e)));
    }

    // Over the page ceiling: extract only the first N pages.
    warn!(
        total_pages,
        max_pages, "PDF over page ceiling, truncating to first pages"
    );
    let page_numbers: Vec<u32> = pages.keys().copied().take(max_pages).collect();
    doc.extract_text(&page_numbers)
        .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_rejected_before_parsing() {
        let limits = ExtractLimits {
            max_bytes: 16,
            max_pages: 500,
        };
        let err = extract_text(&[0u8; 32], MIME_PDF, limits).unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn unsupported_content_type_rejected() {
        let err = extract_text(b"hello", "application/octet-stream", ExtractLimits::default())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported content type"));
    }

    #[test]
    fn invalid_pdf_bytes_fail() {
        let err = extract_text(b"not a pdf", MIME_PDF, ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text(
            "transformer attention heads".as_bytes(),
            MIME_TEXT,
            ExtractLimits::default(),
        )
        .unwrap();
        assert_eq!(text, "transformer attention heads");
    }

    #[test]
    fn non_utf8_text_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT, ExtractLimits::default())
            .unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }
}
