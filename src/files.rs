//! Temporary artifact storage.
//!
//! Every downloaded source and every converted output lives in one shared
//! working directory. Jobs never read each other's files, so the only
//! coordination needed is that names never collide: each name combines the
//! wall clock, a process-wide sequence number and a short hash of the
//! original file name.
//!
//! Files are released twice over: the job that wrote them deletes them on
//! every exit path (see [`crate::dialogue`]), and [`FileStore::purge_stale`]
//! sweeps anything older than the configured maximum age in case a crash
//! skipped that.

use crate::error::BotError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Longest file name (in characters) returned by [`sanitize`].
pub const MAX_FILE_NAME_CHARS: usize = 100;

static ILLEGAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("static regex is valid"));

/// Owner of the shared working directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    sequence: AtomicU64,
}

impl FileStore {
    /// Open (creating if needed) the working directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BotError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| BotError::WorkDir {
            path: root.clone(),
            source,
        })?;
        debug!("Working directory ready: {}", root.display());
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate a collision-resistant name: `{millis}_{seq}_{hash8}.{ext}`.
    ///
    /// The hash is derived from `original_name` only, so two users uploading
    /// `report.pdf` in the same millisecond still differ by sequence number.
    pub fn unique_name(&self, original_name: &str, extension: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let digest = Sha256::digest(original_name.as_bytes());
        let hash = hex::encode(&digest[..4]);
        let ext = extension.trim_start_matches('.');
        format!("{millis}_{seq}_{hash}.{ext}")
    }

    /// Full path for a fresh artifact; see [`FileStore::unique_name`].
    pub fn unique_path(&self, original_name: &str, extension: &str) -> PathBuf {
        self.root.join(self.unique_name(original_name, extension))
    }

    /// Delete one artifact. A missing file is not an error; any other
    /// failure is logged and swallowed.
    pub fn remove(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed artifact {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove artifact {}: {}", path.display(), e),
        }
    }

    /// Delete every file whose modification time is older than `max_age`.
    ///
    /// Returns the number of files deleted. Never fails: a file that cannot
    /// be inspected or deleted is logged and skipped.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        self.purge_stale_at(max_age, SystemTime::now())
    }

    /// [`FileStore::purge_stale`] measured against an explicit `now`.
    pub fn purge_stale_at(&self, max_age: Duration, now: SystemTime) -> usize {
        self.purge_with(max_age, now, |path| std::fs::remove_file(path))
    }

    fn purge_with(
        &self,
        max_age: Duration,
        now: SystemTime,
        remove: impl Fn(&Path) -> std::io::Result<()>,
    ) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let modified = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };
            let age = match modified {
                Ok(mtime) => now.duration_since(mtime).unwrap_or_default(),
                Err(e) => {
                    warn!("No modification time for {}: {}", path.display(), e);
                    continue;
                }
            };
            if age > max_age {
                match remove(&path) {
                    Ok(()) => {
                        info!("Purged stale artifact {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to purge {}: {}", path.display(), e),
                }
            }
        }
        removed
    }
}

/// Replace characters that are illegal in file names and cap the length at
/// [`MAX_FILE_NAME_CHARS`], keeping the extension intact.
pub fn sanitize(filename: &str) -> String {
    let cleaned = ILLEGAL_CHARS.replace_all(filename.trim(), "_").into_owned();
    if cleaned.chars().count() <= MAX_FILE_NAME_CHARS {
        return cleaned;
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(dot) if dot > 0 => cleaned.split_at(dot),
        _ => (cleaned.as_str(), ""),
    };
    let ext: String = ext.chars().take(MAX_FILE_NAME_CHARS / 2).collect();
    let keep = MAX_FILE_NAME_CHARS - ext.chars().count();
    let stem: String = stem.chars().take(keep).collect();
    format!("{stem}{ext}")
}

/// Name shown to the user for a converted result: the sanitised original
/// name with its `.pdf` suffix replaced by `extension`.
pub fn output_file_name(original_name: &str, extension: &str) -> String {
    let name = sanitize(original_name);
    let stem = match name.rfind('.') {
        Some(dot) if name[dot..].eq_ignore_ascii_case(".pdf") => &name[..dot],
        _ => name.as_str(),
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{stem}.{}", extension.trim_start_matches('.'))
}

/// Human-readable size with one decimal: `512 B`, `1.5 KB`, `20.0 MB`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.1} MB", b as f64 / MB as f64),
        b => format!("{:.1} GB", b as f64 / GB as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("work")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_directory() {
        let (_dir, store) = store();
        assert!(store.root().is_dir());
    }

    #[test]
    fn unique_names_do_not_collide() {
        let (_dir, store) = store();
        let names: HashSet<String> = (0..500)
            .map(|_| store.unique_name("report.pdf", "pdf"))
            .collect();
        assert_eq!(names.len(), 500);
    }

    #[test]
    fn unique_name_shape() {
        let (_dir, store) = store();
        let name = store.unique_name("report.pdf", ".docx");
        assert!(name.ends_with(".docx"), "got: {name}");
        let parts: Vec<&str> = name.trim_end_matches(".docx").split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn purge_removes_only_old_files() {
        let (_dir, store) = store();
        let file = store.unique_path("a.pdf", "pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        std::fs::create_dir(store.root().join("subdir")).unwrap();

        // Fresh file survives.
        assert_eq!(store.purge_stale(Duration::from_secs(3600)), 0);
        assert!(file.exists());

        // Two hours from now it is older than one hour.
        let later = SystemTime::now() + Duration::from_secs(7200);
        assert_eq!(store.purge_stale_at(Duration::from_secs(3600), later), 1);
        assert!(!file.exists());
        assert!(store.root().join("subdir").is_dir());
    }

    #[test]
    fn purge_continues_past_a_failed_deletion() {
        let (_dir, store) = store();
        let paths: Vec<PathBuf> = ["a.pdf", "b.pdf", "c.pdf"]
            .iter()
            .map(|name| {
                let path = store.unique_path(name, "pdf");
                std::fs::write(&path, b"%PDF").unwrap();
                path
            })
            .collect();
        let stuck = paths[1].clone();

        let later = SystemTime::now() + Duration::from_secs(7200);
        let removed = store.purge_with(Duration::from_secs(3600), later, |path| {
            if path == stuck {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "file is locked",
                ))
            } else {
                std::fs::remove_file(path)
            }
        });

        assert_eq!(removed, 2);
        assert!(!paths[0].exists());
        assert!(stuck.exists());
        assert!(!paths[2].exists());
    }

    #[test]
    fn remove_missing_file_is_silent() {
        let (_dir, store) = store();
        store.remove(&store.root().join("nope.txt"));
    }

    #[test]
    fn sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize(r#"a<b>c:d"e/f\g|h?i*j.pdf"#), "a_b_c_d_e_f_g_h_i_j.pdf");
        assert_eq!(sanitize("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn sanitize_truncates_and_keeps_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let s = sanitize(&long);
        assert_eq!(s.chars().count(), MAX_FILE_NAME_CHARS);
        assert!(s.ends_with(".pdf"));
    }

    #[test]
    fn sanitize_counts_characters_not_bytes() {
        let long = format!("{}.pdf", "я".repeat(150));
        let s = sanitize(&long);
        assert_eq!(s.chars().count(), MAX_FILE_NAME_CHARS);
        assert!(s.ends_with(".pdf"));
    }

    #[test]
    fn output_name_swaps_extension() {
        assert_eq!(output_file_name("Report.PDF", "docx"), "Report.docx");
        assert_eq!(output_file_name("notes", "txt"), "notes.txt");
        assert_eq!(output_file_name(".pdf", "xlsx"), "document.xlsx");
        assert_eq!(output_file_name("a/b.pdf", "txt"), "a_b.txt");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(20 * 1024 * 1024), "20.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
