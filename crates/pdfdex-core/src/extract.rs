//! Text extraction: document bytes -> pages -> paragraph units.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::TextExtractor;
use crate::types::{PageText, TextUnit};

/// Extracts per-page text from PDF bytes with `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self { Self }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        // The header may be preceded by junk bytes, but only within the first KiB.
        let head = &bytes[..bytes.len().min(1024)];
        if !head.windows(5).any(|w| w == b"%PDF-") {
            return Err(Error::Extraction("missing %PDF- header".into()));
        }
        // pdf-extract panics on some malformed inputs instead of returning an error.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| Error::Extraction("PDF parser aborted on malformed input".into()))?
            .map_err(|e| Error::Extraction(e.to_string()))?;
        debug!(pages = pages.len(), bytes = bytes.len(), "extracted pdf text");
        Ok(number_pages(pages))
    }
}

/// Treats bytes as (lossy) UTF-8 text; form feeds separate pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self { Self }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        let text = String::from_utf8_lossy(bytes);
        Ok(number_pages(text.split('\x0c').map(str::to_string).collect()))
    }
}

fn number_pages(pages: Vec<String>) -> Vec<PageText> {
    pages
        .into_iter()
        .zip(1u32..)
        .map(|(text, page)| PageText { page, text })
        .collect()
}

/// Splits each page into paragraphs on blank lines.
///
/// Whitespace inside a paragraph (including hard line wraps) collapses to a
/// single space; paragraphs that end up empty are dropped. Paragraph numbers
/// restart at 0 on every page.
pub fn segment_paragraphs(pages: &[PageText]) -> Vec<TextUnit> {
    let mut units = Vec::new();
    for page in pages {
        let mut paragraph = 0u32;
        let mut current: Vec<&str> = Vec::new();
        for line in page.text.lines().chain(std::iter::once("")) {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    let text = current.iter().flat_map(|l| l.split_whitespace()).collect::<Vec<_>>().join(" ");
                    units.push(TextUnit { page: page.page, paragraph, text });
                    paragraph += 1;
                    current.clear();
                }
            } else {
                current.push(line);
            }
        }
    }
    if units.is_empty() && !pages.is_empty() {
        warn!(pages = pages.len(), "document has no extractable text");
    }
    units
}

/// Runs an extractor and segments its output.
pub fn extract_units(extractor: &dyn TextExtractor, bytes: &[u8]) -> Result<Vec<TextUnit>> {
    let pages = extractor.extract(bytes)?;
    Ok(segment_paragraphs(&pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let err = PdfExtractor::new().extract(b"definitely not a pdf").expect_err("must fail");
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn plain_text_pages_split_on_form_feed() {
        let pages = PlainTextExtractor::new().extract(b"first page\x0csecond page").expect("extract");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], PageText { page: 1, text: "first page".into() });
        assert_eq!(pages[1].page, 2);
    }

    #[test]
    fn paragraphs_split_on_blank_lines_and_collapse_wraps() {
        let pages = vec![PageText { page: 3, text: "alpha beta\n  gamma\n\n\n  \ndelta\n".into() }];
        let units = segment_paragraphs(&pages);
        assert_eq!(units, vec![
            TextUnit { page: 3, paragraph: 0, text: "alpha beta gamma".into() },
            TextUnit { page: 3, paragraph: 1, text: "delta".into() },
        ]);
    }

    #[test]
    fn blank_pages_yield_no_units() {
        let pages = vec![PageText { page: 1, text: " \n\n\t".into() }];
        assert!(segment_paragraphs(&pages).is_empty());
    }
}
