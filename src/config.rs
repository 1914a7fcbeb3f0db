//! Bot configuration.
//!
//! Every tunable lives in [`BotConfig`], built through [`BotConfigBuilder`].
//! The binary fills the builder from environment variables; tests fill it
//! directly. Each component receives the budgets and limits it needs from
//! here rather than reading the environment itself.

use crate::error::BotError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Value shipped in `.env` templates; treated as "no token configured".
pub const PLACEHOLDER_TOKEN: &str = "YOUR_BOT_TOKEN_HERE";

/// Default upload ceiling: 20 MiB, the Bot API download limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// MIME type accepted by default.
pub const PDF_MIME: &str = "application/pdf";

/// Configuration for the conversion bot.
///
/// # Example
/// ```rust
/// use pdf_convert_bot::BotConfig;
///
/// let config = BotConfig::builder()
///     .token("123456:ABC")
///     .conversion_timeout_secs(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.conversion_budget().as_secs(), 300);
/// ```
#[derive(Clone)]
pub struct BotConfig {
    /// Bot API credential.
    pub token: String,

    /// Base URL of the Bot API. Default: `https://api.telegram.org`.
    pub api_url: String,

    /// Working directory for downloaded sources and converted outputs.
    /// Default: `temp_files`.
    pub work_dir: PathBuf,

    /// Largest upload accepted, in bytes. Default: 20 MiB.
    pub max_upload_bytes: u64,

    /// Declared media types accepted for upload. Default: `application/pdf`.
    pub supported_mime_types: Vec<String>,

    /// Budget for fetching an attachment to local disk. Default: 60.
    pub download_timeout_secs: u64,

    /// Budget for sending a result file. Default: 60.
    pub upload_timeout_secs: u64,

    /// Wall-clock budget for one conversion job. Default: 600.
    ///
    /// Larger than the transfer budgets: layout reconstruction of a
    /// hundred-page document is far heavier than moving 20 MB.
    pub conversion_timeout_secs: u64,

    /// Budget for control-channel requests (messages, edits, getFile).
    /// Default: 30.
    pub request_timeout_secs: u64,

    /// Long-poll wait passed to `getUpdates`. Default: 25.
    pub poll_timeout_secs: u64,

    /// Conversions allowed per user per window. Default: 10.
    pub rate_limit_max: usize,

    /// Rate-limit window length. Default: 3600.
    pub rate_limit_window_secs: u64,

    /// Lifetime of a pending upload awaiting a choice. Default: 3600.
    pub session_ttl_secs: u64,

    /// Artifacts older than this are purged by the janitor. Default: 86400.
    pub artifact_max_age_secs: u64,

    /// How often the janitor runs. Default: 3600.
    pub janitor_interval_secs: u64,

    /// Options for the to-document conversion.
    pub document: DocumentOptions,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: "https://api.telegram.org".to_string(),
            work_dir: PathBuf::from("temp_files"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            supported_mime_types: vec![PDF_MIME.to_string()],
            download_timeout_secs: 60,
            upload_timeout_secs: 60,
            conversion_timeout_secs: 600,
            request_timeout_secs: 30,
            poll_timeout_secs: 25,
            rate_limit_max: 10,
            rate_limit_window_secs: 3600,
            session_ttl_secs: 3600,
            artifact_max_age_secs: 24 * 3600,
            janitor_interval_secs: 3600,
            document: DocumentOptions::default(),
        }
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("api_url", &self.api_url)
            .field("work_dir", &self.work_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("supported_mime_types", &self.supported_mime_types)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("document", &self.document)
            .finish()
    }
}

impl BotConfig {
    /// Create a new builder for `BotConfig`.
    pub fn builder() -> BotConfigBuilder {
        BotConfigBuilder {
            config: Self::default(),
        }
    }

    /// `true` if `mime` is one of the accepted upload types.
    pub fn accepts_mime(&self, mime: &str) -> bool {
        let mime = mime.trim();
        self.supported_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime))
    }

    pub fn download_budget(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn upload_budget(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn conversion_budget(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }

    pub fn request_budget(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn artifact_max_age(&self) -> Duration {
        Duration::from_secs(self.artifact_max_age_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}

/// Builder for [`BotConfig`].
#[derive(Debug)]
pub struct BotConfigBuilder {
    config: BotConfig,
}

impl BotConfigBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = token.into().trim().to_string();
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Replace the accepted MIME types. Blank entries are dropped.
    pub fn supported_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supported_mime_types = types
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs.max(1);
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_timeout_secs(mut self, secs: u64) -> Self {
        self.config.poll_timeout_secs = secs.min(50);
        self
    }

    pub fn rate_limit(mut self, max: usize, window_secs: u64) -> Self {
        self.config.rate_limit_max = max;
        self.config.rate_limit_window_secs = window_secs;
        self
    }

    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.config.session_ttl_secs = secs;
        self
    }

    pub fn artifact_max_age_secs(mut self, secs: u64) -> Self {
        self.config.artifact_max_age_secs = secs;
        self
    }

    pub fn janitor_interval_secs(mut self, secs: u64) -> Self {
        self.config.janitor_interval_secs = secs.max(1);
        self
    }

    pub fn document(mut self, options: DocumentOptions) -> Self {
        self.config.document = options;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BotConfig, BotError> {
        let c = &self.config;
        if c.token.is_empty() || c.token == PLACEHOLDER_TOKEN {
            return Err(BotError::MissingToken);
        }
        if c.max_upload_bytes == 0 {
            return Err(BotError::InvalidConfig(
                "Maximum upload size must be ≥ 1 byte".into(),
            ));
        }
        if c.supported_mime_types.is_empty() {
            return Err(BotError::InvalidConfig(
                "At least one supported MIME type is required".into(),
            ));
        }
        if c.rate_limit_max == 0 || c.rate_limit_window_secs == 0 {
            return Err(BotError::InvalidConfig(format!(
                "Rate limit must allow ≥ 1 request per window ≥ 1s, got {}/{}s",
                c.rate_limit_max, c.rate_limit_window_secs
            )));
        }
        if c.session_ttl_secs == 0 {
            return Err(BotError::InvalidConfig("Session TTL must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}

/// Options for the to-document conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOptions {
    /// Rebuild pages with their tables and images. When `false`, the
    /// document is plain extracted text. Default: true.
    pub preserve_layout: bool,

    /// Embed raster images found on each page (layout mode only).
    /// Default: true.
    pub include_images: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            preserve_layout: true,
            include_images: true,
        }
    }
}
