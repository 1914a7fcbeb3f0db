//! The per-user conversation: uploads, menu choices and conversion jobs.
//!
//! ```text
//!            upload ok              convert choice
//!   Idle ───────────────▶ AwaitingChoice ───────────▶ Processing
//!    ▲  ◀──── cancel / expiry ────┘                      │
//!    └───────────── success / failure / timeout ─────────┘
//! ```
//!
//! [`DialogueController::handle`] is the only entry point. It never fails:
//! anything that escapes a handler, panics included, is logged and answered
//! with an apology. A job always ends with exactly one outcome message and
//! with every file it wrote deleted, whatever path it took out.

use crate::config::BotConfig;
use crate::convert::{
    ArtifactDetail, ConversionGateway, ConversionJob, ConversionOutcome, TargetKind,
};
use crate::error::{BotError, ConversionError, TransferError};
use crate::files::{output_file_name, FileStore};
use crate::messages;
use crate::pdf::{has_pdf_header, PdfEngine};
use crate::rate_limit::RateLimiter;
use crate::session::{Cancel, Claim, DialogueState, Offer, SessionStore};
use crate::transfer;
use crate::transport::{
    ChatId, ChatTransport, Choice, Command, Event, Menu, MessageRef, UploadDescriptor, UserId,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one janitor pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub artifacts: usize,
    pub sessions: usize,
    pub rate_windows: usize,
}

/// Files written by one job. Dropping the set deletes them.
struct JobArtifacts<'a> {
    store: &'a FileStore,
    paths: Vec<PathBuf>,
}

impl<'a> JobArtifacts<'a> {
    fn new(store: &'a FileStore) -> Self {
        Self {
            store,
            paths: Vec::new(),
        }
    }

    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }
}

impl Drop for JobArtifacts<'_> {
    fn drop(&mut self) {
        for path in &self.paths {
            self.store.remove(path);
        }
    }
}

/// Routes events to handlers and runs conversion jobs.
pub struct DialogueController<E> {
    transport: Arc<dyn ChatTransport>,
    sessions: SessionStore,
    limiter: RateLimiter,
    files: FileStore,
    gateway: ConversionGateway<E>,
    config: BotConfig,
}

impl<E: PdfEngine> DialogueController<E> {
    /// Wire the controller; creates the working directory if needed.
    pub fn new(
        config: BotConfig,
        transport: Arc<dyn ChatTransport>,
        engine: Arc<E>,
    ) -> Result<Self, BotError> {
        let files = FileStore::open(&config.work_dir)?;
        Ok(Self {
            transport,
            sessions: SessionStore::new(config.session_ttl()),
            limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window()),
            gateway: ConversionGateway::new(engine, config.conversion_budget()),
            files,
            config,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: Event) {
        let chat = event.chat();
        let user = event.user();
        let failure = match AssertUnwindSafe(self.dispatch(event)).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        error!(user = ?user, chat = ?chat, "Event handling failed: {}", failure);
        if let Some(chat) = chat {
            if let Err(e) = self.transport.send_text(chat, messages::APOLOGY, None).await {
                warn!(chat = %chat, "Could not deliver apology: {}", e);
            }
        }
    }

    /// Purge stale artifacts, expired sessions and idle rate windows.
    pub async fn sweep(&self) -> Sweep {
        let sweep = Sweep {
            artifacts: self.files.purge_stale(self.config.artifact_max_age()),
            sessions: self.sessions.purge_expired().await,
            rate_windows: self.limiter.purge_idle().await,
        };
        if sweep != Sweep::default() {
            info!(
                "Janitor removed {} artifacts, {} sessions, {} rate windows",
                sweep.artifacts, sweep.sessions, sweep.rate_windows
            );
        }
        sweep
    }

    async fn dispatch(&self, event: Event) -> Result<(), BotError> {
        match event {
            Event::Command {
                user,
                chat,
                command,
            } => self.on_command(user, chat, command).await,
            Event::Upload { user, chat, upload } => self.on_upload(user, chat, upload).await,
            Event::Choice {
                user,
                callback_id,
                message,
                choice,
            } => {
                if let Err(e) = self.transport.answer_choice(&callback_id).await {
                    debug!(user = %user, "answerCallbackQuery failed: {}", e);
                }
                self.on_choice(user, message, choice).await
            }
            Event::Other { chat } => {
                debug!(chat = ?chat, "Ignoring unsupported event");
                Ok(())
            }
        }
    }

    async fn on_command(&self, user: UserId, chat: ChatId, command: Command) -> Result<(), BotError> {
        info!(user = %user, chat = %chat, "Command {:?}", command);
        match command {
            Command::Start => {
                self.transport
                    .send_text(chat, messages::WELCOME, Some(&Menu::welcome()))
                    .await?;
            }
            Command::Help => {
                self.transport
                    .send_text(chat, &messages::help(self.config.max_upload_bytes), None)
                    .await?;
            }
            Command::Info => {
                self.transport.send_text(chat, &messages::info(), None).await?;
            }
        }
        Ok(())
    }

    async fn on_upload(
        &self,
        user: UserId,
        chat: ChatId,
        upload: UploadDescriptor,
    ) -> Result<(), BotError> {
        let accepted = upload
            .mime_type
            .as_deref()
            .is_some_and(|mime| self.config.accepts_mime(mime));
        if !accepted {
            warn!(user = %user, mime = ?upload.mime_type, "Rejected upload: unsupported type");
            self.transport.send_text(chat, messages::NOT_A_PDF, None).await?;
            return Ok(());
        }
        if upload.file_size > self.config.max_upload_bytes {
            warn!(user = %user, size = upload.file_size, "Rejected upload: too large");
            let text = messages::too_large(upload.file_size, self.config.max_upload_bytes);
            self.transport.send_text(chat, &text, None).await?;
            return Ok(());
        }

        let (name, size) = (upload.file_name.clone(), upload.file_size);
        match self.sessions.offer(user, upload).await {
            Offer::Busy => {
                self.transport
                    .send_text(chat, messages::STILL_PROCESSING, None)
                    .await?;
            }
            Offer::Stored { replaced } => {
                info!(user = %user, file = %name, size, replaced, "Upload awaiting choice");
                let remaining = self.limiter.remaining(user).await;
                let text = messages::upload_received(&name, size, remaining, replaced);
                self.transport
                    .send_text(chat, &text, Some(&Menu::conversion()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_choice(
        &self,
        user: UserId,
        message: MessageRef,
        choice: Option<Choice>,
    ) -> Result<(), BotError> {
        let Some(choice) = choice else {
            self.transport
                .edit_text(&message, messages::UNKNOWN_CHOICE, None)
                .await?;
            return Ok(());
        };
        debug!(user = %user, "Choice {:?}", choice);

        match choice {
            Choice::Help => {
                let menu = match self.sessions.state(user).await {
                    DialogueState::Idle => Some(Menu::welcome()),
                    DialogueState::AwaitingChoice => Some(Menu::conversion()),
                    DialogueState::Processing => None,
                };
                let text = messages::help(self.config.max_upload_bytes);
                self.transport.edit_text(&message, &text, menu.as_ref()).await?;
            }
            Choice::Cancel => match self.sessions.cancel(user).await {
                Cancel::Discarded(upload) => {
                    info!(user = %user, file = %upload.file_name, "Pending upload cancelled");
                    self.transport
                        .edit_text(&message, messages::CANCELLED, None)
                        .await?;
                }
                Cancel::NothingPending => {
                    self.transport
                        .edit_text(&message, messages::NOTHING_TO_CANCEL, None)
                        .await?;
                }
                Cancel::Busy => {
                    // The running job owns the status message.
                    self.transport
                        .send_text(message.chat, messages::CANNOT_CANCEL, None)
                        .await?;
                }
            },
            Choice::Convert(target) => self.on_convert(user, message, target).await?,
        }
        Ok(())
    }

    async fn on_convert(
        &self,
        user: UserId,
        status: MessageRef,
        target: TargetKind,
    ) -> Result<(), BotError> {
        let upload = match self.sessions.begin_job(user).await {
            Claim::Started(upload) => upload,
            Claim::NoPending => {
                self.transport
                    .edit_text(&status, messages::NO_PENDING_FILE, None)
                    .await?;
                return Ok(());
            }
            Claim::Busy => {
                self.transport
                    .send_text(status.chat, messages::STILL_PROCESSING, None)
                    .await?;
                return Ok(());
            }
        };

        if !self.limiter.allowed(user).await {
            self.sessions.release_job(user).await;
            warn!(user = %user, "Conversion refused: rate limit");
            let text =
                messages::rate_limited(self.config.rate_limit_max, self.config.rate_limit_window());
            self.transport.send_text(status.chat, &text, None).await?;
            return Ok(());
        }

        info!(
            user = %user,
            file = %upload.file_name,
            format = %target,
            budget_secs = self.gateway.budget().as_secs(),
            "Job started"
        );
        let mut artifacts = JobArtifacts::new(&self.files);
        let result = AssertUnwindSafe(self.run_job(user, &status, target, &upload, &mut artifacts))
            .catch_unwind()
            .await;
        drop(artifacts);
        self.sessions.finish_job(user).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                return Err(BotError::Internal(format!(
                    "conversion job panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
        };
        info!(user = %user, format = %target, "Job finished");
        self.transport.edit_text(&status, &outcome, None).await?;
        Ok(())
    }

    /// Download, validate, convert and deliver. Returns the outcome message.
    async fn run_job(
        &self,
        user: UserId,
        status: &MessageRef,
        target: TargetKind,
        upload: &UploadDescriptor,
        artifacts: &mut JobArtifacts<'_>,
    ) -> String {
        self.progress(status, messages::DOWNLOADING).await;
        let source = artifacts.track(self.files.unique_path(&upload.file_name, "pdf"));
        let bytes = match transfer::fetch_to_path(
            self.transport.as_ref(),
            &upload.file_id,
            &source,
            self.config.download_budget(),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(TransferError::Timeout { secs }) => return messages::download_timeout(secs),
            Err(TransferError::Network(_)) => return messages::DOWNLOAD_FAILED.to_string(),
        };

        self.progress(status, messages::VALIDATING).await;
        if bytes > self.config.max_upload_bytes {
            warn!(user = %user, bytes, "Downloaded file exceeds the size limit");
            return messages::downloaded_too_large(self.config.max_upload_bytes);
        }
        match has_pdf_header(&source) {
            Ok(true) => {}
            Ok(false) => {
                warn!(user = %user, "Downloaded file has no PDF header");
                return messages::CORRUPT_PDF.to_string();
            }
            Err(e) => {
                error!(user = %user, path = %source.display(), "Cannot read download: {}", e);
                return messages::conversion_failed(target);
            }
        }
        let metadata = match self.gateway.inspect(&source).await {
            ConversionOutcome::Success(metadata) => metadata,
            ConversionOutcome::Failure(e) => return failure_message(target, e),
            ConversionOutcome::Timeout { secs } => return messages::conversion_timeout(secs),
        };

        let converting =
            messages::converting(target, metadata.page_count, metadata.title.as_deref());
        self.progress(status, &converting).await;
        let output = artifacts.track(self.files.unique_path(&upload.file_name, target.extension()));
        let job = ConversionJob {
            source,
            output,
            target,
            document: self.config.document,
        };
        let artifact = match self.gateway.run(job).await {
            ConversionOutcome::Success(artifact) => artifact,
            ConversionOutcome::Failure(e) => return failure_message(target, e),
            ConversionOutcome::Timeout { secs } => return messages::conversion_timeout(secs),
        };
        info!(user = %user, pages = artifact.pages, detail = ?artifact.detail, "Artifact written");

        self.progress(status, messages::UPLOADING).await;
        let result_name = output_file_name(&upload.file_name, target.extension());
        let caption = messages::result_caption(&upload.file_name, &result_name, target);
        match transfer::send_from_path(
            self.transport.as_ref(),
            status.chat,
            &artifact.path,
            &result_name,
            &caption,
            self.config.upload_budget(),
        )
        .await
        {
            Ok(()) => {}
            Err(TransferError::Timeout { secs }) => return messages::upload_timeout(secs),
            Err(TransferError::Network(_)) => return messages::UPLOAD_FAILED.to_string(),
        }

        let mut done = messages::done(target);
        if artifact.detail == (ArtifactDetail::Spreadsheet { tables: 0 }) {
            done.push_str(messages::NO_TABLES_NOTE);
        }
        done
    }

    /// Best-effort status update; a failed edit never fails the job.
    async fn progress(&self, status: &MessageRef, text: &str) {
        if let Err(e) = self.transport.edit_text(status, text, None).await {
            debug!(chat = %status.chat, "Status update failed: {}", e);
        }
    }
}

fn failure_message(target: TargetKind, error: ConversionError) -> String {
    match error {
        ConversionError::NoTextExtracted => messages::NO_TEXT.to_string(),
        ConversionError::EmptyDocument { .. } => messages::EMPTY_PDF.to_string(),
        e if e.is_input_problem() => messages::CORRUPT_PDF.to_string(),
        e => {
            error!(format = %target, "Conversion failed: {}", e);
            messages::conversion_failed(target)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_copy_by_error_kind() {
        assert_eq!(
            failure_message(TargetKind::PlainText, ConversionError::NoTextExtracted),
            messages::NO_TEXT
        );
        assert_eq!(
            failure_message(
                TargetKind::Document,
                ConversionError::EmptyDocument { path: "a.pdf".into() }
            ),
            messages::EMPTY_PDF
        );
        assert_eq!(
            failure_message(
                TargetKind::Document,
                ConversionError::CorruptPdf {
                    path: "a.pdf".into(),
                    detail: "xref".into()
                }
            ),
            messages::CORRUPT_PDF
        );
        assert_eq!(
            failure_message(TargetKind::Spreadsheet, ConversionError::Panicked("x".into())),
            messages::conversion_failed(TargetKind::Spreadsheet)
        );
    }

    #[test]
    fn panic_payloads_are_readable() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom");
        let caught = std::panic::catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "formatted 1");
    }

    #[test]
    fn dropping_job_artifacts_deletes_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let kept = dir.path().join("unrelated.txt");
        std::fs::write(&kept, b"keep").unwrap();
        {
            let mut artifacts = JobArtifacts::new(&store);
            let a = artifacts.track(store.unique_path("in.pdf", "pdf"));
            let b = artifacts.track(store.unique_path("in.pdf", "docx"));
            std::fs::write(&a, b"%PDF").unwrap();
            std::fs::write(&b, b"PK").unwrap();
            // A path that was never written is fine too.
            artifacts.track(store.unique_path("in.pdf", "txt"));
        }
        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(left.len(), 1);
        assert!(kept.exists());
    }
}
