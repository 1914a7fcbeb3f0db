//! Startup pre-checks of the `pdf-convert-bot` binary.
//!
//! Each failed pre-check prints a diagnostic and exits with status 0 before
//! any network traffic happens.
//!
//! Run with:
//!   cargo test --test cli

#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn bot(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pdf-convert-bot"));
    // No `.env` in a fresh directory, so only the variables set here apply.
    cmd.current_dir(dir)
        .env_remove("BOT_TOKEN")
        .env_remove("PDFIUM_LIB_PATH")
        .env("TEMP_DIR", dir.join("work"))
        .env("RUST_LOG", "off");
    cmd
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_token_exits_cleanly_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let output = bot(dir.path()).output().unwrap();

    assert!(output.status.success(), "status: {:?}", output.status);
    assert!(stderr(&output).contains("Bot token is not set"), "{}", stderr(&output));
}

#[test]
fn placeholder_token_counts_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let output = bot(dir.path())
        .env("BOT_TOKEN", "YOUR_BOT_TOKEN_HERE")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(stderr(&output).contains("Bot token is not set"));
}

#[test]
fn unloadable_engine_exits_cleanly_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let fake_library = dir.path().join("libpdfium.so");
    std::fs::write(&fake_library, b"this is not a shared library").unwrap();

    let output = bot(dir.path())
        .env("BOT_TOKEN", "123456:TEST")
        .env("PDFIUM_LIB_PATH", &fake_library)
        .output()
        .unwrap();

    let err = stderr(&output);
    assert!(output.status.success(), "status: {:?}\n{err}", output.status);
    assert!(err.contains("PDF engine unavailable"), "{err}");
    assert!(err.contains("libpdfium.so"), "{err}");
}
