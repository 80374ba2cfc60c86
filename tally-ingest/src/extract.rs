//! Text extraction: document bytes -> ordered page texts.
//!
//! PDFs are read page by page; plain text is split on form feeds (U+000C).
//! Nothing here interprets the text; scanned image-only documents come back as
//! [`ExtractionFailure::NoText`] because no OCR is attempted.

use std::panic::{self, AssertUnwindSafe};

use tally_core::ExtractionFailure;
use tracing::{debug, warn};

use crate::types::ExtractedPage;

const PAGE_BREAK: char = '\u{000C}';

/// Turns raw bytes into page text. Implementations must not panic outward.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractionFailure>;
}

/// PDF text layer extraction via `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractionFailure> {
        if !has_pdf_header(bytes) {
            return Err(ExtractionFailure::Unreadable(
                "not a PDF document (missing %PDF- header)".to_string(),
            ));
        }

        // pdf-extract panics on some malformed inputs; keep that inside this stage.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }));

        let pages = match result {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!(error = %e, "pdf text extraction failed");
                return Err(ExtractionFailure::Unreadable(e.to_string()));
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                warn!(panic = %msg, "pdf library panicked during extraction");
                return Err(ExtractionFailure::Unreadable(format!(
                    "malformed or unsupported PDF ({msg})"
                )));
            }
        };

        split_pages(&pages.join(PAGE_BREAK.to_string().as_str()))
    }
}

/// Treats the bytes as (lossy) UTF-8 text. Used for `.txt` exports and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractionFailure> {
        let text = String::from_utf8_lossy(bytes);
        split_pages(&text)
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

fn split_pages(text: &str) -> Result<Vec<ExtractedPage>, ExtractionFailure> {
    let pages: Vec<ExtractedPage> = text
        .split(PAGE_BREAK)
        .enumerate()
        .map(|(i, t)| ExtractedPage {
            number: i + 1,
            text: t.to_string(),
        })
        .collect();

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(ExtractionFailure::NoText);
    }

    debug!(
        pages = pages.len(),
        chars = text.len(),
        "extracted document text"
    );
    Ok(pages)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_pages() {
        let pages = PlainTextExtractor
            .extract(b"page one\nline\x0cpage two")
            .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].text, "page two");
    }

    #[test]
    fn test_blank_text_is_no_text() {
        assert_eq!(
            PlainTextExtractor.extract(b"  \n\t\x0c \n"),
            Err(ExtractionFailure::NoText)
        );
        assert_eq!(PlainTextExtractor.extract(b""), Err(ExtractionFailure::NoText));
    }

    #[test]
    fn test_non_pdf_bytes_are_unreadable() {
        let err = PdfTextExtractor.extract(b"hello, not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionFailure::Unreadable(_)));
    }

    /// Minimal uncompressed PDF, one Helvetica text line per page.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        ];
        for (i, text) in pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                5 + 2 * i
            ));
            let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ));
        }

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for off in offsets {
            tail.push_str(&format!("{:010} 00000 n \n", off));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        ));
        out.extend_from_slice(tail.as_bytes());
        out
    }

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_pdf_text_per_page() {
        let bytes = pdf_with_pages(&[
            "01/15/2024 STARBUCKS COFFEE -5.75",
            "03/02/2024 PAYROLL DEPOSIT 1500.00",
        ]);
        let pages = PdfTextExtractor.extract(&bytes).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert!(squash(&pages[0].text).contains("STARBUCKS COFFEE -5.75"));
        assert!(!pages[0].text.contains("PAYROLL"));
        assert!(squash(&pages[1].text).contains("PAYROLL DEPOSIT 1500.00"));
    }

    #[test]
    fn test_pdf_without_text_is_no_text() {
        let bytes = pdf_with_pages(&[""]);
        assert_eq!(PdfTextExtractor.extract(&bytes), Err(ExtractionFailure::NoText));
    }

    #[test]
    fn test_corrupt_pdf_does_not_panic() {
        let bytes = b"%PDF-1.4\n1 0 obj << /Type /Catalog /Pages 2 0 R >>\ngarbage\n%%EOF";
        assert!(PdfTextExtractor.extract(bytes).is_err());
    }
}
