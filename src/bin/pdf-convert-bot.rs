//! CLI binary for pdf-convert-bot.
//!
//! Reads the configuration from the environment (an optional `.env` file is
//! loaded first), makes sure the PDF engine is available, then runs the bot
//! until Ctrl+C.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_convert_bot::config::{DEFAULT_MAX_UPLOAD_BYTES, PDF_MIME, PLACEHOLDER_TOKEN};
use pdf_convert_bot::{bot, engine, BotConfig, BotError, DocumentOptions, PdfiumEngine};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"ENVIRONMENT VARIABLES:
  BOT_TOKEN               Bot API token from @BotFather (required)
  MAX_FILE_SIZE           Largest accepted upload in bytes
  SUPPORTED_MIME_TYPES    Comma-separated accepted media types
  DOWNLOAD_TIMEOUT_SECS   Budget for fetching an upload
  UPLOAD_TIMEOUT_SECS     Budget for sending a result
  CONVERSION_TIMEOUT_SECS Budget for one conversion
  REQUEST_TIMEOUT_SECS    Budget for messages and menu updates
  TEMP_DIR                Working directory for job files
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Log filter (overrides --verbose)

SETUP:
  1. echo "BOT_TOKEN=123456:ABC..." > .env
  2. pdf-convert-bot

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdf-convert-bot/pdfium-7690/.
"#;

/// Telegram bot converting PDF files to Word, Excel and text.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-convert-bot",
    version,
    about = "Telegram bot converting PDF files to Word, Excel and text",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bot API token.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Bot API base URL.
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    api_url: String,

    /// Largest accepted upload, in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_file_size: u64,

    /// Accepted media types.
    #[arg(long, env = "SUPPORTED_MIME_TYPES", value_delimiter = ',', default_value = PDF_MIME)]
    mime_types: Vec<String>,

    #[arg(long, env = "DOWNLOAD_TIMEOUT_SECS", default_value_t = 60)]
    download_timeout: u64,

    #[arg(long, env = "UPLOAD_TIMEOUT_SECS", default_value_t = 60)]
    upload_timeout: u64,

    #[arg(long, env = "CONVERSION_TIMEOUT_SECS", default_value_t = 600)]
    conversion_timeout: u64,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout: u64,

    /// Long-poll wait for new updates.
    #[arg(long, env = "POLL_TIMEOUT_SECS", default_value_t = 25)]
    poll_timeout: u64,

    /// Working directory for downloaded and converted files.
    #[arg(long, env = "TEMP_DIR", default_value = "temp_files")]
    temp_dir: PathBuf,

    /// Conversions allowed per user per window.
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 10)]
    rate_limit_max: usize,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 3600)]
    rate_limit_window: u64,

    /// How long an upload waits for a conversion choice.
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 3600)]
    session_ttl: u64,

    /// Job files older than this are swept.
    #[arg(long, env = "ARTIFACT_MAX_AGE_SECS", default_value_t = 86_400)]
    artifact_max_age: u64,

    #[arg(long, env = "JANITOR_INTERVAL_SECS", default_value_t = 3600)]
    janitor_interval: u64,

    /// Rebuild page layout (tables, images) in Word output.
    #[arg(long, env = "PRESERVE_LAYOUT", default_value_t = true, action = ArgAction::Set)]
    preserve_layout: bool,

    /// Embed page images in Word output.
    #[arg(long, env = "INCLUDE_IMAGES", default_value_t = true, action = ArgAction::Set)]
    include_images: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self, token: &str) -> Result<BotConfig, BotError> {
        BotConfig::builder()
            .token(token)
            .api_url(&self.api_url)
            .max_upload_bytes(self.max_file_size)
            .supported_mime_types(&self.mime_types)
            .download_timeout_secs(self.download_timeout)
            .upload_timeout_secs(self.upload_timeout)
            .conversion_timeout_secs(self.conversion_timeout)
            .request_timeout_secs(self.request_timeout)
            .poll_timeout_secs(self.poll_timeout)
            .work_dir(&self.temp_dir)
            .rate_limit(self.rate_limit_max, self.rate_limit_window)
            .session_ttl_secs(self.session_ttl)
            .artifact_max_age_secs(self.artifact_max_age)
            .janitor_interval_secs(self.janitor_interval)
            .document(DocumentOptions {
                preserve_layout: self.preserve_layout,
                include_images: self.include_images,
            })
            .build()
    }
}

/// Print a startup diagnostic. Startup pre-check failures exit with 0.
fn diagnose(error: &dyn std::fmt::Display) {
    eprintln!("{} {}", red("✗"), bold("pdf-convert-bot cannot start"));
    eprintln!("{error}");
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Pre-check: credentials ───────────────────────────────────────────
    let token = cli.token.as_deref().map(str::trim).unwrap_or_default();
    if token.is_empty() || token == PLACEHOLDER_TOKEN {
        diagnose(&BotError::MissingToken);
        return Ok(());
    }
    let config = match cli.config(token) {
        Ok(config) => config,
        Err(e) => {
            diagnose(&e);
            return Ok(());
        }
    };
    tracing::debug!("{:?}", config);

    // ── Pre-check: PDF engine ────────────────────────────────────────────
    // The first run downloads pdfium (~30 MB); later runs only check the path.
    let library = if let Some(path) = engine::locate() {
        Ok(path)
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("PDF engine");
        bar.enable_steady_tick(Duration::from_millis(80));

        let progress = bar.clone();
        let provisioned = tokio::task::block_in_place(|| {
            engine::provision(Some(&|downloaded, total| {
                if let Some(total) = total {
                    if progress.length() != Some(total) {
                        progress.set_length(total);
                    }
                }
                progress.set_position(downloaded);
            }))
        });
        match &provisioned {
            Ok(_) => bar.finish_with_message("ready ✓"),
            Err(_) => bar.abandon(),
        }
        provisioned
    };
    let library = match library {
        Ok(path) => path,
        Err(e) => {
            diagnose(&e);
            return Ok(());
        }
    };
    let engine = Arc::new(PdfiumEngine::new(library));
    if let Err(e) = engine.check() {
        diagnose(&BotError::EngineUnavailable(format!(
            "{} could not be loaded: {}",
            engine.library().display(),
            e
        )));
        return Ok(());
    }

    bot::run(config, engine).await.context("Bot stopped with an error")?;
    Ok(())
}
