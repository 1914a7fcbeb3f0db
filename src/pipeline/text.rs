//! Plain-text extraction.

use crate::convert::AbandonFlag;
use crate::error::ConversionError;
use crate::pdf::PdfHandle;
use std::path::Path;
use tracing::debug;

/// Separator placed between the texts of consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// All page texts, in page order, joined by a blank line.
///
/// Pages with no text (blank pages, scanned images) are skipped, so a
/// document without any text layer yields an empty string.
pub fn extract_text(doc: &dyn PdfHandle, abandon: &AbandonFlag) -> Result<String, ConversionError> {
    let mut pages = Vec::with_capacity(doc.page_count());
    for index in 0..doc.page_count() {
        abandon.check()?;
        let text = doc.text_of_page(index)?;
        let text = text.trim_end();
        if text.trim().is_empty() {
            debug!("Page {}: no text", index + 1);
            continue;
        }
        pages.push(text.to_string());
    }
    Ok(pages.join(PAGE_SEPARATOR).trim().to_string())
}

/// Extract the text and write it to `output` as UTF-8.
///
/// An empty extraction is [`ConversionError::NoTextExtracted`] and writes
/// nothing. Returns the number of characters written.
pub fn convert(
    doc: &dyn PdfHandle,
    output: &Path,
    abandon: &AbandonFlag,
) -> Result<usize, ConversionError> {
    let text = extract_text(doc, abandon)?;
    if text.is_empty() {
        return Err(ConversionError::NoTextExtracted);
    }
    abandon.check()?;
    std::fs::write(output, &text).map_err(|source| ConversionError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(text.chars().count())
}
