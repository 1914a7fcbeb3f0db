//! Locating (and on first run, downloading) the pdfium shared library.
//!
//! Resolution order:
//!
//! 1. `PDFIUM_LIB_PATH`, if it names an existing file.
//! 2. The per-version cache directory
//!    (`$PDFIUM_AUTO_CACHE_DIR/pdfium-{VERSION}/`, else
//!    `<platform cache dir>/pdf-convert-bot/pdfium-{VERSION}/`).
//! 3. Download the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//!    and unpack the library into that cache directory.
//!
//! The archive is decompressed while it streams in; only the library member
//! is written to disk, first to a temporary file in the cache directory and
//! then renamed into place, so an interrupted download never leaves a
//! truncated library behind.
//!
//! Everything here is blocking. The binary calls [`provision`] once at
//! startup, before the event loop starts.

use crate::error::BotError;
use flate2::read::GzDecoder;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// pdfium-binaries release tag.
pub const PDFIUM_VERSION: &str = "7690";

/// Points at an existing pdfium library; skips the cache and download.
pub const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Overrides the base of the cache directory.
pub const CACHE_DIR_ENV: &str = "PDFIUM_AUTO_CACHE_DIR";

const RELEASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Download progress callback: `(bytes so far, total if known)`.
pub type Progress<'a> = &'a dyn Fn(u64, Option<u64>);

/// Where the library lives for one OS/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Platform {
    archive: &'static str,
    member: &'static str,
    file_name: &'static str,
}

/// `(os, arch, archive)` for every published build.
const BUILDS: &[(&str, &str, &str)] = &[
    ("macos", "aarch64", "pdfium-mac-arm64.tgz"),
    ("macos", "x86_64", "pdfium-mac-x64.tgz"),
    ("linux", "x86_64", "pdfium-linux-x64.tgz"),
    ("linux", "aarch64", "pdfium-linux-arm64.tgz"),
    ("windows", "x86_64", "pdfium-win-x64.tgz"),
    ("windows", "aarch64", "pdfium-win-arm64.tgz"),
    ("windows", "x86", "pdfium-win-x86.tgz"),
];

fn platform_for(os: &str, arch: &str) -> Option<Platform> {
    let &(_, _, archive) = BUILDS.iter().find(|(o, a, _)| *o == os && *a == arch)?;
    let (member, file_name) = match os {
        "macos" => ("lib/libpdfium.dylib", "libpdfium.dylib"),
        "windows" => ("bin/pdfium.dll", "pdfium.dll"),
        _ => ("lib/libpdfium.so", "libpdfium.so"),
    };
    Some(Platform {
        archive,
        member,
        file_name,
    })
}

fn current_platform() -> Result<Platform, BotError> {
    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    platform_for(os, arch)
        .ok_or_else(|| BotError::EngineUnavailable(format!("unsupported platform {os}/{arch}")))
}

/// Per-version cache directory, honouring [`CACHE_DIR_ENV`].
pub fn cache_dir() -> PathBuf {
    cache_dir_from(std::env::var_os(CACHE_DIR_ENV))
}

fn cache_dir_from(base_override: Option<OsString>) -> PathBuf {
    let versioned = format!("pdfium-{PDFIUM_VERSION}");
    match base_override {
        Some(base) if !base.is_empty() => PathBuf::from(base).join(versioned),
        _ => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join(env!("CARGO_PKG_NAME"))
            .join(versioned),
    }
}

/// The library path if it is already available without any download.
pub fn locate() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(LIB_PATH_ENV).map(PathBuf::from) {
        if explicit.is_file() {
            return Some(explicit);
        }
        warn!(
            "{} points at '{}', which does not exist; ignoring it",
            LIB_PATH_ENV,
            explicit.display()
        );
    }
    let platform = current_platform().ok()?;
    let cached = cache_dir().join(platform.file_name);
    cached.is_file().then_some(cached)
}

/// Return the library path, downloading it into the cache if needed.
pub fn provision(on_progress: Option<Progress<'_>>) -> Result<PathBuf, BotError> {
    if let Some(path) = locate() {
        debug!("Using pdfium at {}", path.display());
        return Ok(path);
    }

    let platform = current_platform()?;
    let dir = cache_dir();
    std::fs::create_dir_all(&dir).map_err(|e| {
        BotError::EngineUnavailable(format!("cannot create cache dir '{}': {e}", dir.display()))
    })?;

    let url = format!(
        "{RELEASE_URL}/chromium%2F{PDFIUM_VERSION}/{}",
        platform.archive
    );
    info!("Downloading pdfium {} from {}", PDFIUM_VERSION, url);

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| BotError::EngineUnavailable(format!("HTTP client: {e}")))?;
    let response = client
        .get(&url)
        .send()
        .map_err(|e| BotError::EngineUnavailable(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(BotError::EngineUnavailable(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let reader = ProgressReader {
        inner: response,
        read: 0,
        total,
        on_progress,
    };
    let dest = dir.join(platform.file_name);
    extract_member(reader, platform.member, &dest)?;
    info!("pdfium installed at {}", dest.display());
    Ok(dest)
}

/// Unpack `member` from a gzipped tar stream into `dest`.
fn extract_member(archive: impl Read, member: &str, dest: &Path) -> Result<(), BotError> {
    let fail = |what: &str, e: std::io::Error| BotError::EngineUnavailable(format!("{what}: {e}"));
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));

    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries().map_err(|e| fail("reading archive", e))? {
        let mut entry = entry.map_err(|e| fail("reading archive entry", e))?;
        let is_member = entry
            .path()
            .map(|p| p == Path::new(member))
            .map_err(|e| fail("reading entry path", e))?;
        if !is_member {
            continue;
        }

        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| fail("creating temp file", e))?;
        std::io::copy(&mut entry, staged.as_file_mut()).map_err(|e| fail("unpacking", e))?;
        staged
            .persist(dest)
            .map_err(|e| fail("moving library into place", e.error))?;
        return Ok(());
    }

    Err(BotError::EngineUnavailable(format!(
        "'{member}' not found in archive"
    )))
}

/// `Read` adapter that reports cumulative bytes to a callback.
struct ProgressReader<'a, R> {
    inner: R,
    read: u64,
    total: Option<u64>,
    on_progress: Option<Progress<'a>>,
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if let Some(report) = self.on_progress {
            report(self.read, self.total);
        }
        Ok(n)
    }
}
