//! Spreadsheet (XLSX) output of detected tables.
//!
//! Layout when the document has tables:
//!
//! | sheet        | contents                                              |
//! |--------------|-------------------------------------------------------|
//! | `All tables` | `Page │ Table │ Column 1 … Column N`, every table row |
//! | `Page <n>`   | same columns, only the tables found on page *n*       |
//!
//! Table numbers restart at 1 on each page. A document without any table
//! gets a single `Text` sheet holding the whole extracted text instead; that
//! is a normal result, not an error. Text longer than one cell can hold
//! continues in the cells below, so concatenating column A gives the text
//! back unchanged.

use crate::convert::AbandonFlag;
use crate::error::ConversionError;
use crate::pdf::PdfHandle;
use crate::pipeline::layout::Table;
use crate::pipeline::text;
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::debug;

/// Name of the combined sheet.
pub const ALL_TABLES_SHEET: &str = "All tables";

/// Name of the fallback sheet.
pub const TEXT_SHEET: &str = "Text";

/// Longest sheet name Excel accepts.
pub const MAX_SHEET_NAME_CHARS: usize = 31;

/// Longest string Excel stores in one cell.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Tables found on one page (page numbers are 1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct PageTables {
    pub page: usize,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

/// One worksheet: a bold header row followed by data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// What [`convert`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadsheetSummary {
    /// Tables written; `0` means the text fallback was used.
    pub tables: usize,
    pub sheets: usize,
}

/// Convert `doc` to an XLSX workbook at `output`.
pub fn convert(
    doc: &dyn PdfHandle,
    output: &Path,
    abandon: &AbandonFlag,
) -> Result<SpreadsheetSummary, ConversionError> {
    let mut pages = Vec::new();
    for index in 0..doc.page_count() {
        abandon.check()?;
        let tables = doc.tables_of_page(index)?;
        if !tables.is_empty() {
            debug!("Page {}: {} tables", index + 1, tables.len());
            pages.push(PageTables {
                page: index + 1,
                tables,
            });
        }
    }

    let tables: usize = pages.iter().map(|p| p.tables.len()).sum();
    let sheets = if tables > 0 {
        table_layout(&pages)
    } else {
        debug!("No tables found; falling back to text sheet");
        text_layout(&text::extract_text(doc, abandon)?)
    };

    abandon.check()?;
    write_workbook(&sheets, output)?;
    Ok(SpreadsheetSummary {
        tables,
        sheets: sheets.len(),
    })
}

/// Combined sheet plus one sheet per page with tables. Empty input gives no
/// sheets.
pub fn table_layout(pages: &[PageTables]) -> Vec<Sheet> {
    if pages.iter().all(|p| p.tables.is_empty()) {
        return Vec::new();
    }

    let mut combined = Sheet {
        name: ALL_TABLES_SHEET.to_string(),
        header: Vec::new(),
        rows: Vec::new(),
    };
    let mut per_page = Vec::new();
    let mut widest = 0;

    for page in pages.iter().filter(|p| !p.tables.is_empty()) {
        let mut sheet = Sheet {
            name: format!("Page {}", page.page),
            header: Vec::new(),
            rows: Vec::new(),
        };
        let mut page_widest = 0;
        for (t, table) in page.tables.iter().enumerate() {
            for row in table {
                page_widest = page_widest.max(row.len());
                let mut cells = Vec::with_capacity(row.len() + 2);
                cells.push(Cell::Number(page.page as f64));
                cells.push(Cell::Number((t + 1) as f64));
                cells.extend(row.iter().map(|c| Cell::Text(c.clone())));
                sheet.rows.push(cells.clone());
                combined.rows.push(cells);
            }
        }
        sheet.header = header(page_widest);
        widest = widest.max(page_widest);
        per_page.push(sheet);
    }
    combined.header = header(widest);

    let mut sheets = Vec::with_capacity(per_page.len() + 1);
    sheets.push(combined);
    sheets.extend(per_page);
    sheets
}

/// Single `Text` sheet: the text split into [`MAX_CELL_CHARS`] pieces, one
/// row each.
pub fn text_layout(text: &str) -> Vec<Sheet> {
    let rows = split_chars(text, MAX_CELL_CHARS)
        .into_iter()
        .map(|piece| vec![Cell::Text(piece.to_string())])
        .collect();
    vec![Sheet {
        name: TEXT_SHEET.to_string(),
        header: vec![TEXT_SHEET.to_string()],
        rows,
    }]
}

/// Consecutive slices of at most `max` characters. Never empty: an empty
/// `text` gives one empty slice.
fn split_chars(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some((byte, _)) = rest.char_indices().nth(max) {
        let (head, tail) = rest.split_at(byte);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

fn header(columns: usize) -> Vec<String> {
    let mut header = vec!["Page".to_string(), "Table".to_string()];
    header.extend((1..=columns).map(|i| format!("Column {i}")));
    header
}

/// Strip characters Excel forbids in sheet names and cap the length.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'');
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME_CHARS).collect();
    if truncated.trim().is_empty() {
        "Sheet".to_string()
    } else {
        truncated
    }
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Write `sheets` to an XLSX file at `output`.
pub fn write_workbook(sheets: &[Sheet], output: &Path) -> Result<(), ConversionError> {
    let fail = |e: rust_xlsxwriter::XlsxError| ConversionError::SpreadsheetWrite {
        path: output.to_path_buf(),
        detail: e.to_string(),
    };

    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();
    let mut used: Vec<String> = Vec::new();

    for sheet in sheets {
        let mut name = sanitize_sheet_name(&sheet.name);
        let mut n = 2;
        while used.iter().any(|u| u.eq_ignore_ascii_case(&name)) {
            let suffix = format!(" ({n})");
            let stem: String = name
                .chars()
                .take(MAX_SHEET_NAME_CHARS - suffix.chars().count())
                .collect();
            name = format!("{stem}{suffix}");
            n += 1;
        }
        used.push(name.clone());

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name).map_err(fail)?;

        for (col, title) in sheet.header.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, clip(title), &bold)
                .map_err(fail)?;
        }
        for (r, row) in sheet.rows.iter().enumerate() {
            let r = (r + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let written = match cell {
                    Cell::Text(s) => worksheet.write_string(r, col as u16, clip(s)),
                    Cell::Number(v) => worksheet.write_number(r, col as u16, *v),
                };
                written.map_err(fail)?;
            }
        }
        worksheet.autofit();
    }

    workbook.save(output).map_err(fail)
}
