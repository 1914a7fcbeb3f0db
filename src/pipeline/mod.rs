//! Conversion stages, one per output format.
//!
//! Every stage runs synchronously on the blocking worker and reads the
//! document through a [`crate::pdf::PdfHandle`], never through pdfium
//! directly, so each one can be tested against an in-memory fake.
//!
//! ## Data Flow
//!
//! ```text
//!                ┌──▶ text        ──▶ .txt
//! PdfHandle ─────┼──▶ document    ──▶ .docx   (layout: lines + tables + images)
//!   (pdfium)     └──▶ spreadsheet ──▶ .xlsx   (layout: tables, or text fallback)
//! ```
//!
//! 1. [`layout`]: rebuild lines and tables from positioned text spans
//! 2. [`text`]: page texts joined by a blank line
//! 3. [`document`]: word-processor output via `docx-rs`
//! 4. [`spreadsheet`]: workbook output via `rust_xlsxwriter`
//!
//! Stages check the job's [`crate::convert::AbandonFlag`] between pages and
//! stop early once the job's budget has run out.

pub mod document;
pub mod layout;
pub mod spreadsheet;
pub mod text;
