//! # pdf-convert-bot
//!
//! A chat bot that turns uploaded PDF documents into Word (DOCX), Excel
//! (XLSX) or plain-text files.
//!
//! ## Why this crate?
//!
//! Converting a PDF is slow, blocking, and occasionally never finishes. A
//! bot serving many users at once cannot let one large document stall the
//! others, run two jobs for the same user, or leave half-written files on
//! disk when a job times out. This crate keeps the conversion itself simple
//! (pdfium for reading, `docx-rs` and `rust_xlsxwriter` for writing) and puts
//! the care into the orchestration around it.
//!
//! ## Job Overview
//!
//! ```text
//! upload (declared type + size checked)
//!  │
//!  ├─ 1. Choice    user picks Word / Excel / text        session → Processing
//!  ├─ 2. Download  attachment → working dir              download budget
//!  ├─ 3. Validate  %PDF header, real size, page count
//!  ├─ 4. Convert   pdfium + writer on the blocking pool  conversion budget
//!  ├─ 5. Deliver   result file + caption                 upload budget
//!  └─ 6. Cleanup   every job file deleted                session → Idle
//! ```
//!
//! Each budget produces its own timeout message, distinct from a failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_convert_bot::{bot, engine, BotConfig, PdfiumEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let library = engine::provision(None)?;
//!     let config = BotConfig::builder().token("123456:ABC").build()?;
//!     bot::run(config, Arc::new(PdfiumEngine::new(library))).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-convert-bot` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when embedding the library:
//! ```toml
//! pdf-convert-bot = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bot;
pub mod config;
pub mod convert;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod files;
pub mod messages;
pub mod pdf;
pub mod pipeline;
pub mod rate_limit;
pub mod session;
pub mod telegram;
pub mod transfer;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BotConfig, BotConfigBuilder, DocumentOptions};
pub use convert::{
    AbandonFlag, Artifact, ArtifactDetail, ConversionGateway, ConversionJob, ConversionOutcome,
    TargetKind,
};
pub use dialogue::{DialogueController, Sweep};
pub use error::{BotError, ConversionError, TransferError, TransportError};
pub use files::FileStore;
pub use pdf::{DocumentMetadata, PageImage, PdfEngine, PdfHandle, PdfiumEngine};
pub use rate_limit::RateLimiter;
pub use session::{DialogueState, SessionStore};
pub use telegram::TelegramClient;
pub use transport::{
    ChatId, ChatTransport, Choice, Command, Event, Menu, MessageRef, UploadDescriptor, UserId,
};
