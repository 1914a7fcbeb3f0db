//! Error types for the pdf-convert-bot library.
//!
//! Four error types, one per layer:
//!
//! * [`BotError`]: fatal or controller-level. Configuration is invalid,
//!   the PDF engine cannot be provisioned, or a handler hit something it
//!   could not map to a user message. Startup returns it; the dialogue
//!   controller logs it and apologises to the user.
//!
//! * [`TransportError`]: a call to the chat platform failed (HTTP, API
//!   rejection, local file I/O while streaming an attachment).
//!
//! * [`TransferError`]: the result of a *budgeted* download or upload. Only
//!   two failure reasons matter to the user: the budget ran out, or the
//!   network failed. [`crate::transfer`] collapses [`TransportError`] into it.
//!
//! * [`ConversionError`]: a conversion job failed for a reason other than
//!   its wall-clock budget. Timeouts are not errors at all; they are the
//!   `Timeout` arm of [`crate::convert::ConversionOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Fatal and controller-level errors.
#[derive(Debug, Error)]
pub enum BotError {
    // ── Startup ───────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No bot token was configured, or the placeholder was left in place.
    #[error("Bot token is not set.\nCreate a .env file with BOT_TOKEN=<your token>.")]
    MissingToken,

    /// The pdfium shared library could not be located, downloaded or bound.
    #[error(
        "PDF engine unavailable: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the download failed you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    EngineUnavailable(String),

    /// The working directory could not be created.
    #[error("Cannot prepare working directory '{path}': {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Runtime ───────────────────────────────────────────────────────────
    /// A chat-platform call made outside of a budgeted transfer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by a [`crate::transport::ChatTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a usable HTTP response.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The platform answered but refused the call.
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },

    /// Reading or writing the local side of an attachment failed.
    #[error("Attachment I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

/// Outcome reasons of a budgeted download or upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The transfer did not finish within its budget.
    #[error("Transfer timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Any transport or network failure.
    #[error("Transfer failed: {0}")]
    Network(String),
}

/// A conversion job failed (as opposed to running out of time).
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The PDF engine could not open or parse the document.
    #[error("PDF '{path}' is corrupt or unsupported: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The document opened but has no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// A page could not be read.
    #[error("Failed to read page {page}: {detail}")]
    PageFailed { page: usize, detail: String },

    /// No page yielded any text (typically a scanned document).
    #[error("No extractable text found")]
    NoTextExtracted,

    /// The DOCX writer failed.
    #[error("Failed to write document '{path}': {detail}")]
    DocumentWrite { path: PathBuf, detail: String },

    /// The XLSX writer failed.
    #[error("Failed to write spreadsheet '{path}': {detail}")]
    SpreadsheetWrite { path: PathBuf, detail: String },

    /// Plain file I/O on an artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job outlived its budget and stopped at the next page boundary.
    #[error("Conversion abandoned after its budget expired")]
    Abandoned,

    /// The PDF engine could not be bound for this job.
    #[error("PDF engine unavailable: {0}")]
    Engine(String),

    /// The blocking worker panicked.
    #[error("Conversion worker panicked: {0}")]
    Panicked(String),
}

impl ConversionError {
    /// `true` when the document itself is the problem (bad upload) rather
    /// than the converter.
    pub fn is_input_problem(&self) -> bool {
        matches!(
            self,
            ConversionError::CorruptPdf { .. } | ConversionError::EmptyDocument { .. }
        )
    }
}
