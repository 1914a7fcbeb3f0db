//! Word-processor (DOCX) output.
//!
//! Two modes, chosen by [`DocumentOptions::preserve_layout`]:
//!
//! - **structural**: per page, the reconstructed lines become paragraphs,
//!   detected tables become real tables, and (with `include_images`) the
//!   page's raster images are embedded; pages are separated by page breaks.
//! - **plain**: the extracted text, one paragraph per non-empty line.

use crate::config::DocumentOptions;
use crate::convert::AbandonFlag;
use crate::error::ConversionError;
use crate::pdf::{PageImage, PdfHandle};
use crate::pipeline::layout::Block;
use crate::pipeline::text;
use docx_rs::{BreakType, Docx, Paragraph, Pic, Run, Table, TableCell, TableRow};
use std::path::Path;
use tracing::debug;

/// English Metric Units per pixel at 96 DPI.
const EMU_PER_PX: u32 = 9525;

/// Widest picture placed on a page (6 inches).
const MAX_PICTURE_EMU: u32 = 6 * 914_400;

/// Title size in half-points.
const TITLE_SIZE: usize = 32;

/// Everything the structural writer needs from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub blocks: Vec<Block>,
    pub images: Vec<PageImage>,
}

/// Convert `doc` to a DOCX at `output`. Returns the number of pages read.
pub fn convert(
    doc: &dyn PdfHandle,
    options: DocumentOptions,
    output: &Path,
    abandon: &AbandonFlag,
) -> Result<usize, ConversionError> {
    let docx = if options.preserve_layout {
        let mut pages = Vec::with_capacity(doc.page_count());
        for index in 0..doc.page_count() {
            abandon.check()?;
            let blocks = doc.blocks_of_page(index)?;
            let images = if options.include_images {
                doc.images_of_page(index)?
            } else {
                Vec::new()
            };
            debug!(
                "Page {}: {} blocks, {} images",
                index + 1,
                blocks.len(),
                images.len()
            );
            pages.push(PageContent { blocks, images });
        }
        build_structured(doc.metadata().title.as_deref(), &pages)
    } else {
        build_plain(&text::extract_text(doc, abandon)?)
    };

    abandon.check()?;
    save(docx, output)?;
    Ok(doc.page_count())
}

/// Structural document: optional title, then each page in turn.
pub fn build_structured(title: Option<&str>, pages: &[PageContent]) -> Docx {
    let mut docx = Docx::new();
    if let Some(title) = title {
        docx = docx.add_paragraph(
            Paragraph::new().add_run(Run::new().add_text(title).bold().size(TITLE_SIZE)),
        );
    }

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            docx =
                docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
        }
        for block in &page.blocks {
            docx = match block {
                Block::Line(line) => docx.add_paragraph(paragraph(line)),
                Block::Table(rows) => docx.add_table(table(rows)),
            };
        }
        for image in &page.images {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_image(picture(image))));
        }
    }
    docx
}

/// Plain document: one paragraph per non-empty line of `text`.
pub fn build_plain(text: &str) -> Docx {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .fold(Docx::new(), |docx, line| docx.add_paragraph(paragraph(line)))
}

fn paragraph(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

fn table(rows: &[Vec<String>]) -> Table {
    Table::new(
        rows.iter()
            .map(|row| {
                TableRow::new(
                    row.iter()
                        .map(|cell| TableCell::new().add_paragraph(paragraph(cell)))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn picture(image: &PageImage) -> Pic {
    let (width, height) = picture_extent(image.width, image.height);
    Pic::new_with_dimensions(image.png.clone(), image.width, image.height).size(width, height)
}

/// Display size in EMU, shrunk proportionally to fit the page width.
fn picture_extent(width_px: u32, height_px: u32) -> (u32, u32) {
    let width = width_px as u64 * EMU_PER_PX as u64;
    let height = height_px as u64 * EMU_PER_PX as u64;
    if width <= MAX_PICTURE_EMU as u64 {
        return (width as u32, height as u32);
    }
    let height = height * MAX_PICTURE_EMU as u64 / width;
    (MAX_PICTURE_EMU, height as u32)
}

fn save(docx: Docx, output: &Path) -> Result<(), ConversionError> {
    let file = std::fs::File::create(output).map_err(|source| ConversionError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    docx.build()
        .pack(file)
        .map_err(|e| ConversionError::DocumentWrite {
            path: output.to_path_buf(),
            detail: e.to_string(),
        })
}
