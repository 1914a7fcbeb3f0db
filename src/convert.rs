//! Conversion gateway: the three conversions behind one budgeted call.
//!
//! ## Why spawn_blocking?
//!
//! pdfium and the DOCX/XLSX writers are synchronous and CPU-heavy. Each job
//! runs on tokio's blocking pool so the event loop keeps answering other
//! users (and `cancel` presses) while a large document converts.
//!
//! ## Why an abandon flag?
//!
//! A blocking task cannot be killed. When the wall-clock budget runs out
//! the gateway reports [`ConversionOutcome::Timeout`] straight away and
//! raises the job's [`AbandonFlag`]. The worker notices it at the next page
//! boundary, stops, and deletes any output it already wrote, so a timed-out
//! job never leaves an artifact behind.

use crate::config::DocumentOptions;
use crate::error::ConversionError;
use crate::pdf::{DocumentMetadata, PdfEngine, PdfHandle};
use crate::pipeline::{document, spreadsheet, text};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Output representation requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Editable word-processor document (`.docx`).
    Document,
    /// Workbook of extracted tables (`.xlsx`).
    Spreadsheet,
    /// UTF-8 text (`.txt`).
    PlainText,
}

impl TargetKind {
    pub fn extension(self) -> &'static str {
        match self {
            TargetKind::Document => "docx",
            TargetKind::Spreadsheet => "xlsx",
            TargetKind::PlainText => "txt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetKind::Document => "Word",
            TargetKind::Spreadsheet => "Excel",
            TargetKind::PlainText => "text",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Shared "stop working" signal between the gateway and one worker.
#[derive(Debug, Clone, Default)]
pub struct AbandonFlag(Arc<AtomicBool>);

impl AbandonFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Abandoned)` once raised; stages call this between pages.
    pub fn check(&self) -> Result<(), ConversionError> {
        if self.is_raised() {
            Err(ConversionError::Abandoned)
        } else {
            Ok(())
        }
    }
}

/// Result of a budgeted conversion call. Every call site must handle all
/// three arms.
#[derive(Debug)]
pub enum ConversionOutcome<T> {
    Success(T),
    Failure(ConversionError),
    Timeout { secs: u64 },
}

/// One conversion attempt. Not retried; a new attempt needs a new job.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub target: TargetKind,
    pub document: DocumentOptions,
}

/// Format-specific facts about a produced file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDetail {
    Document,
    /// `tables == 0` means the text fallback sheet was written.
    Spreadsheet { tables: usize },
    Text { chars: usize },
}

/// A converted file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub target: TargetKind,
    pub pages: usize,
    pub detail: ArtifactDetail,
}

/// Runs conversions on the blocking pool under a wall-clock budget.
#[derive(Debug)]
pub struct ConversionGateway<E> {
    engine: Arc<E>,
    budget: Duration,
}

impl<E> Clone for ConversionGateway<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            budget: self.budget,
        }
    }
}

impl<E: PdfEngine> ConversionGateway<E> {
    pub fn new(engine: Arc<E>, budget: Duration) -> Self {
        Self { engine, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Open `source` and read its metadata. A document without pages is a
    /// [`ConversionError::EmptyDocument`] failure.
    pub async fn inspect(&self, source: &Path) -> ConversionOutcome<DocumentMetadata> {
        let source = source.to_path_buf();
        self.guarded("inspect", None, move |engine, _| {
            engine.with_document(&source, |doc| {
                require_pages(doc, &source)?;
                Ok(doc.metadata())
            })
        })
        .await
    }

    /// Run `job` with the conversion matching its target.
    pub async fn run(&self, job: ConversionJob) -> ConversionOutcome<Artifact> {
        match job.target {
            TargetKind::Document => {
                self.to_document(&job.source, &job.output, job.document)
                    .await
            }
            TargetKind::Spreadsheet => self.to_spreadsheet(&job.source, &job.output).await,
            TargetKind::PlainText => self.to_plain_text(&job.source, &job.output).await,
        }
    }

    pub async fn to_document(
        &self,
        source: &Path,
        output: &Path,
        options: DocumentOptions,
    ) -> ConversionOutcome<Artifact> {
        let (source, output) = (source.to_path_buf(), output.to_path_buf());
        let out = output.clone();
        self.guarded("document", Some(output), move |engine, abandon| {
            engine.with_document(&source, |doc| {
                require_pages(doc, &source)?;
                let pages = document::convert(doc, options, &out, abandon)?;
                Ok(Artifact {
                    path: out.clone(),
                    target: TargetKind::Document,
                    pages,
                    detail: ArtifactDetail::Document,
                })
            })
        })
        .await
    }

    pub async fn to_spreadsheet(&self, source: &Path, output: &Path) -> ConversionOutcome<Artifact> {
        let (source, output) = (source.to_path_buf(), output.to_path_buf());
        let out = output.clone();
        self.guarded("spreadsheet", Some(output), move |engine, abandon| {
            engine.with_document(&source, |doc| {
                require_pages(doc, &source)?;
                let summary = spreadsheet::convert(doc, &out, abandon)?;
                Ok(Artifact {
                    path: out.clone(),
                    target: TargetKind::Spreadsheet,
                    pages: doc.page_count(),
                    detail: ArtifactDetail::Spreadsheet {
                        tables: summary.tables,
                    },
                })
            })
        })
        .await
    }

    pub async fn to_plain_text(&self, source: &Path, output: &Path) -> ConversionOutcome<Artifact> {
        let (source, output) = (source.to_path_buf(), output.to_path_buf());
        let out = output.clone();
        self.guarded("text", Some(output), move |engine, abandon| {
            engine.with_document(&source, |doc| {
                require_pages(doc, &source)?;
                let chars = text::convert(doc, &out, abandon)?;
                Ok(Artifact {
                    path: out.clone(),
                    target: TargetKind::PlainText,
                    pages: doc.page_count(),
                    detail: ArtifactDetail::Text { chars },
                })
            })
        })
        .await
    }

    /// Run `work` on the blocking pool within the budget.
    ///
    /// `output` is deleted by the worker itself if it finishes after the
    /// budget expired.
    async fn guarded<T, F>(
        &self,
        label: &'static str,
        output: Option<PathBuf>,
        work: F,
    ) -> ConversionOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce(&E, &AbandonFlag) -> Result<T, ConversionError> + Send + 'static,
    {
        let started = Instant::now();
        let engine = Arc::clone(&self.engine);
        let abandon = AbandonFlag::default();
        let worker_flag = abandon.clone();
        debug!("Conversion '{}' started (budget {}s)", label, self.budget.as_secs());

        let task = tokio::task::spawn_blocking(move || {
            let result = work(engine.as_ref(), &worker_flag);
            if worker_flag.is_raised() {
                if let Some(path) = &output {
                    discard(path);
                }
            }
            result
        });

        match tokio::time::timeout(self.budget, task).await {
            Ok(Ok(Ok(value))) => {
                info!(
                    "Conversion '{}' finished in {:.1}s",
                    label,
                    started.elapsed().as_secs_f64()
                );
                ConversionOutcome::Success(value)
            }
            Ok(Ok(Err(e))) => {
                error!("Conversion '{}' failed: {}", label, e);
                ConversionOutcome::Failure(e)
            }
            Ok(Err(join)) => {
                error!("Conversion '{}' worker panicked: {}", label, join);
                ConversionOutcome::Failure(ConversionError::Panicked(join.to_string()))
            }
            Err(_) => {
                abandon.raise();
                warn!(
                    "Conversion '{}' exceeded its {}s budget; abandoning worker",
                    label,
                    self.budget.as_secs()
                );
                ConversionOutcome::Timeout {
                    secs: self.budget.as_secs(),
                }
            }
        }
    }
}

fn require_pages(doc: &dyn PdfHandle, source: &Path) -> Result<(), ConversionError> {
    if doc.page_count() == 0 {
        return Err(ConversionError::EmptyDocument {
            path: source.to_path_buf(),
        });
    }
    Ok(())
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Abandoned worker removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Abandoned worker could not remove {}: {}", path.display(), e),
    }
}
