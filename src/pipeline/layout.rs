//! Page layout reconstruction from positioned text spans.
//!
//! pdfium hands back text as segments with bounding boxes (PDF user space,
//! origin bottom-left). This module turns them into reading-order
//! [`Block`]s:
//!
//! 1. Sort spans top-to-bottom, then left-to-right.
//! 2. Group spans whose vertical centres lie within `0.4 × height` of the
//!    previous span into one row.
//! 3. Split each row into cells wherever the horizontal gap exceeds
//!    `max(2 × average character width, 6pt)`.
//! 4. A run of at least two consecutive rows that each have the same cell
//!    count (≥ 2) is a table; every other row is a plain line.
//!
//! Everything is a pure function of the input spans, so the same page always
//! yields the same tables.

use std::cmp::Ordering;

/// Narrowest gap (in points) that can separate two table cells.
const MIN_CELL_GAP: f32 = 6.0;

/// A run of text with its bounding box (points, origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl TextSpan {
    fn centre_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    fn height(&self) -> f32 {
        (self.top - self.bottom).abs()
    }

    fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }
}

/// Rows × columns of cell text.
pub type Table = Vec<Vec<String>>;

/// One reading-order element of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Line(String),
    Table(Table),
}

/// Reconstruct the page as lines and tables, top to bottom.
pub fn analyse(spans: &[TextSpan]) -> Vec<Block> {
    let rows: Vec<Vec<String>> = group_rows(spans).iter().map(|r| split_cells(r)).collect();

    let mut blocks = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        let width = rows[i].len();
        let mut end = i + 1;
        if width >= 2 {
            while end < rows.len() && rows[end].len() == width {
                end += 1;
            }
        }
        if width >= 2 && end - i >= 2 {
            blocks.push(Block::Table(rows[i..end].to_vec()));
        } else {
            end = i + 1;
            blocks.push(Block::Line(rows[i].join(" ")));
        }
        i = end;
    }
    blocks
}

/// Only the tables of [`analyse`], in page order.
pub fn detect_tables(spans: &[TextSpan]) -> Vec<Table> {
    analyse(spans)
        .into_iter()
        .filter_map(|b| match b {
            Block::Table(t) => Some(t),
            Block::Line(_) => None,
        })
        .collect()
}

fn group_rows(spans: &[TextSpan]) -> Vec<Vec<&TextSpan>> {
    let mut sorted: Vec<&TextSpan> = spans.iter().filter(|s| !s.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| {
        b.centre_y()
            .partial_cmp(&a.centre_y())
            .unwrap_or(Ordering::Equal)
            .then(a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal))
    });

    let mut rows: Vec<Vec<&TextSpan>> = Vec::new();
    for span in sorted {
        let joins = rows
            .last()
            .and_then(|row| row.last())
            .map(|last| {
                let tolerance = (last.height() * 0.4).max(1.0);
                (span.centre_y() - last.centre_y()).abs() < tolerance
            })
            .unwrap_or(false);
        match rows.last_mut() {
            Some(row) if joins => row.push(span),
            _ => rows.push(vec![span]),
        }
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal));
    }
    rows
}

fn split_cells(row: &[&TextSpan]) -> Vec<String> {
    let chars: usize = row.iter().map(|s| s.text.chars().count()).sum();
    let width: f32 = row.iter().map(|s| s.width()).sum();
    let avg_char = if chars > 0 { width / chars as f32 } else { 0.0 };
    let cell_gap = (avg_char * 2.0).max(MIN_CELL_GAP);
    let space_gap = avg_char * 0.3;

    let mut cells: Vec<String> = Vec::new();
    let mut prev_right: Option<f32> = None;
    for span in row {
        let text = span.text.trim();
        match prev_right {
            Some(right) if span.left - right <= cell_gap => {
                if let Some(cell) = cells.last_mut() {
                    if span.left - right > space_gap {
                        cell.push(' ');
                    }
                    cell.push_str(text);
                }
            }
            _ => cells.push(text.to_string()),
        }
        prev_right = Some(prev_right.map_or(span.right, |r| r.max(span.right)));
    }
    cells
}
