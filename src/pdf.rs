//! PDF reading: the engine seam and its pdfium implementation.
//!
//! ## Why a closure-scoped handle?
//!
//! A `pdfium-render` document borrows the `Pdfium` bindings that opened it,
//! so an owned "open document" value would be self-referential. Instead,
//! [`PdfEngine::with_document`] opens the file, lends a [`PdfHandle`] to the
//! caller's closure, and closes everything when the closure returns. All
//! calls happen on the blocking worker thread that runs the conversion.
//!
//! ## Why cap image edges?
//!
//! Embedded scans can be enormous (a 600 DPI A3 page is ~7,000 × 10,000 px).
//! Word documents only need screen resolution, so anything longer than
//! [`MAX_IMAGE_EDGE`] on its longest side is downscaled before PNG encoding.

use crate::error::ConversionError;
use crate::pipeline::layout::{self, Block, Table, TextSpan};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Longest edge (pixels) of an image embedded into a generated document.
pub const MAX_IMAGE_EDGE: u32 = 2048;

/// Descriptive metadata of an opened document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
}

/// A raster image found on a page, re-encoded as PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Read access to one open document. Page indices are 0-based.
pub trait PdfHandle {
    fn page_count(&self) -> usize;

    fn metadata(&self) -> DocumentMetadata;

    /// The page's text in the engine's own reading order.
    fn text_of_page(&self, index: usize) -> Result<String, ConversionError>;

    /// Positioned text runs of the page.
    fn spans_of_page(&self, index: usize) -> Result<Vec<TextSpan>, ConversionError>;

    /// Raster images placed on the page.
    fn images_of_page(&self, index: usize) -> Result<Vec<PageImage>, ConversionError>;

    /// Lines and tables of the page, top to bottom.
    fn blocks_of_page(&self, index: usize) -> Result<Vec<Block>, ConversionError> {
        Ok(layout::analyse(&self.spans_of_page(index)?))
    }

    /// Tables detected on the page.
    fn tables_of_page(&self, index: usize) -> Result<Vec<Table>, ConversionError> {
        Ok(layout::detect_tables(&self.spans_of_page(index)?))
    }
}

/// Opens documents. Implementations must be usable from any blocking thread.
pub trait PdfEngine: Send + Sync + 'static {
    /// Open `path`, run `f` against it, close it.
    ///
    /// Fails with [`ConversionError::CorruptPdf`] when the file cannot be
    /// parsed.
    fn with_document<R, F>(&self, path: &Path, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&dyn PdfHandle) -> Result<R, ConversionError>;
}

/// `true` if the file starts with the `%PDF` magic bytes.
pub fn has_pdf_header(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = std::fs::File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"%PDF"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Encode `img` as PNG, downscaling it to [`MAX_IMAGE_EDGE`] first if needed.
pub fn encode_png(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let img = if img.width().max(img.height()) > MAX_IMAGE_EDGE {
        img.thumbnail(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE)
    } else {
        img.clone()
    };
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        png.len()
    );
    Ok(PageImage {
        png,
        width: img.width(),
        height: img.height(),
    })
}

/// [`PdfEngine`] backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    library: PathBuf,
}

impl PdfiumEngine {
    /// Engine that loads pdfium from `library` (see [`crate::engine`]).
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
        }
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    /// Load the library once to prove it is usable.
    pub fn check(&self) -> Result<(), ConversionError> {
        self.bind().map(drop)
    }

    fn bind(&self) -> Result<Pdfium, ConversionError> {
        Pdfium::bind_to_library(&self.library)
            .map(Pdfium::new)
            .map_err(|e| {
                ConversionError::Engine(format!(
                    "cannot load '{}': {:?}",
                    self.library.display(),
                    e
                ))
            })
    }
}

impl PdfEngine for PdfiumEngine {
    fn with_document<R, F>(&self, path: &Path, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&dyn PdfHandle) -> Result<R, ConversionError>,
    {
        let pdfium = self.bind()?;
        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| ConversionError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;
        let handle = PdfiumHandle {
            document: &document,
        };
        f(&handle)
    }
}

struct PdfiumHandle<'d, 'p> {
    document: &'d PdfDocument<'p>,
}

impl<'p> PdfiumHandle<'_, 'p> {
    fn page(&self, index: usize) -> Result<PdfPage<'p>, ConversionError> {
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| ConversionError::PageFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })
    }
}

impl PdfHandle for PdfiumHandle<'_, '_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn metadata(&self) -> DocumentMetadata {
        let metadata = self.document.metadata();
        let tag = |kind: PdfDocumentMetadataTagType| -> Option<String> {
            metadata
                .get(kind)
                .map(|t| t.value().trim().to_string())
                .filter(|v| !v.is_empty())
        };
        DocumentMetadata {
            title: tag(PdfDocumentMetadataTagType::Title),
            author: tag(PdfDocumentMetadataTagType::Author),
            subject: tag(PdfDocumentMetadataTagType::Subject),
            creator: tag(PdfDocumentMetadataTagType::Creator),
            producer: tag(PdfDocumentMetadataTagType::Producer),
            page_count: self.page_count(),
        }
    }

    fn text_of_page(&self, index: usize) -> Result<String, ConversionError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| ConversionError::PageFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?;
        Ok(text.all())
    }

    fn spans_of_page(&self, index: usize) -> Result<Vec<TextSpan>, ConversionError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| ConversionError::PageFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?;

        let spans = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                if content.trim().is_empty() {
                    return None;
                }
                let bounds = segment.bounds();
                Some(TextSpan {
                    text: content,
                    left: bounds.left().value,
                    right: bounds.right().value,
                    top: bounds.top().value,
                    bottom: bounds.bottom().value,
                })
            })
            .collect::<Vec<_>>();
        debug!("Page {}: {} text spans", index + 1, spans.len());
        Ok(spans)
    }

    fn images_of_page(&self, index: usize) -> Result<Vec<PageImage>, ConversionError> {
        let page = self.page(index)?;
        let mut images = Vec::new();
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            let raw = match image_object.get_raw_image() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Page {}: unreadable image skipped: {:?}", index + 1, e);
                    continue;
                }
            };
            match encode_png(&raw) {
                Ok(encoded) => images.push(encoded),
                Err(e) => warn!("Page {}: image encoding failed: {}", index + 1, e),
            }
        }
        Ok(images)
    }
}
