//! User-facing copy.
//!
//! Every string the bot sends lives here so wording changes touch one file
//! and tests can assert on the exact text the dialogue produced. All
//! messages are Telegram-flavoured HTML; anything user-controlled (file
//! names, document titles) goes through [`escape_html`] first.

use crate::convert::TargetKind;
use crate::files::format_size;
use std::time::Duration;

/// Escape `&`, `<`, `>` and `"` for HTML message bodies.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

pub const WELCOME: &str = "🤖 <b>PDF Converter Bot</b>

Welcome! I convert PDF files into other formats.

<b>What I can do:</b>
📄 PDF → Word (DOCX)
📊 PDF → Excel (XLSX)
📝 Extract plain text
📋 Extract tables

<b>How to use:</b>
1. Send me a PDF file
2. Pick a conversion
3. Get your result!

<b>Commands:</b>
/start - Start over
/help - Usage help
/info - About this bot

Just send a PDF to begin! 🚀";

/// `/help` text and the answer to the help button.
pub fn help(max_upload_bytes: u64) -> String {
    format!(
        "📖 <b>How to use this bot</b>

<b>Formats:</b>
• Input: PDF
• Output: DOCX, XLSX, TXT

<b>📄 PDF → Word:</b>
• Keeps the page layout
• Embeds images
• Rebuilds tables

<b>📊 PDF → Excel:</b>
• Extracts every table
• One combined sheet plus one sheet per page
• Documents without tables get their text instead

<b>📝 Text only:</b>
• All text, page by page

<b>Limits:</b>
• Maximum file size: {}
• PDF files only

<b>Steps:</b>
1. Send a PDF
2. Pick a conversion
3. Wait while it is processed
4. Receive the converted file",
        format_size(max_upload_bytes)
    )
}

/// `/info` text.
pub fn info() -> String {
    format!(
        "ℹ️ <b>About this bot</b>

<b>Version:</b> {}
<b>Built with:</b> Rust, pdfium, docx-rs, rust_xlsxwriter

<b>Features:</b>
✅ PDF to Word
✅ PDF to Excel
✅ Text extraction
✅ Table extraction
✅ Layout preservation
✅ Image handling

<b>Privacy:</b>
🔒 Files are processed on this server only
🔒 Temporary files are deleted after each conversion
🔒 Nothing you send is kept",
        env!("CARGO_PKG_VERSION")
    )
}

// ── Upload ───────────────────────────────────────────────────────────────

pub const NOT_A_PDF: &str = "❌ Please send a PDF file.";

pub fn too_large(declared_bytes: u64, max_bytes: u64) -> String {
    format!(
        "❌ The file is too large!\nMaximum size: {}\nYour file: {}",
        format_size(max_bytes),
        format_size(declared_bytes)
    )
}

pub fn upload_received(file_name: &str, size_bytes: u64, remaining: usize, replaced: bool) -> String {
    let mut text = format!(
        "📁 <b>File received:</b> {}\n📏 <b>Size:</b> {}\n🔢 <b>Conversions left this hour:</b> {}\n",
        escape_html(file_name),
        format_size(size_bytes),
        remaining
    );
    if replaced {
        text.push_str("♻️ Your previous file was replaced.\n");
    }
    text.push_str("\nChoose a conversion:");
    text
}

// ── Dialogue state ───────────────────────────────────────────────────────

pub const STILL_PROCESSING: &str =
    "⏳ Your previous file is still being processed. Please wait for it to finish.";

pub const NO_PENDING_FILE: &str = "❌ File not found. Please send the PDF again.";

pub const CANCELLED: &str = "❌ Operation cancelled.";

pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel. Send a PDF to begin.";

pub const CANNOT_CANCEL: &str =
    "⏳ A conversion is already running and cannot be cancelled. You will get the result shortly.";

pub const UNKNOWN_CHOICE: &str = "❓ This button is no longer supported. Please send the PDF again.";

pub fn rate_limited(max: usize, window: Duration) -> String {
    format!(
        "🚦 You have reached the limit of {} conversions per {}. Please try again later.",
        max,
        window_span(window)
    )
}

/// Whole minutes when the window divides evenly, seconds otherwise.
fn window_span(window: Duration) -> String {
    let secs = window.as_secs().max(1);
    match (secs / 60, secs % 60) {
        (1, 0) => "minute".to_string(),
        (minutes, 0) => format!("{} minutes", minutes),
        _ if secs == 1 => "second".to_string(),
        _ => format!("{} seconds", secs),
    }
}

// ── Job progress ─────────────────────────────────────────────────────────

pub const DOWNLOADING: &str = "⏳ Downloading your file...";

pub const VALIDATING: &str = "🔍 Checking the PDF...";

pub fn converting(target: TargetKind, pages: usize, title: Option<&str>) -> String {
    let mut text = format!(
        "⏳ Converting to {}... Please wait.\n📄 <b>Pages:</b> {}",
        target.label(),
        pages
    );
    if let Some(title) = title {
        text.push_str(&format!("\n🏷 <b>Title:</b> {}", escape_html(title)));
    }
    text
}

pub const UPLOADING: &str = "📤 Sending the result...";

// ── Job outcomes ─────────────────────────────────────────────────────────

pub fn done(target: TargetKind) -> String {
    match target {
        TargetKind::Document => "✅ File converted to Word!".to_string(),
        TargetKind::Spreadsheet => "✅ File converted to Excel!".to_string(),
        TargetKind::PlainText => "✅ Text extracted!".to_string(),
    }
}

pub const NO_TABLES_NOTE: &str = "\nℹ️ No tables were found, so the sheet contains the document text.";

pub fn result_caption(source_name: &str, result_name: &str, target: TargetKind) -> String {
    let (heading, icon) = match target {
        TargetKind::Document => ("Conversion complete!", "📄"),
        TargetKind::Spreadsheet => ("Conversion complete!", "📊"),
        TargetKind::PlainText => ("Text extracted!", "📝"),
    };
    format!(
        "✅ <b>{}</b>\n{} {} → {}",
        heading,
        icon,
        escape_html(source_name),
        escape_html(result_name)
    )
}

pub const CORRUPT_PDF: &str = "❌ The file is damaged or is not a valid PDF!";

pub const EMPTY_PDF: &str = "❌ The PDF has no pages.";

pub fn downloaded_too_large(max_bytes: u64) -> String {
    format!(
        "❌ The downloaded file is larger than {}.",
        format_size(max_bytes)
    )
}

pub fn download_timeout(secs: u64) -> String {
    format!("⌛ Downloading the file took longer than {secs} seconds. Please try again.")
}

pub const DOWNLOAD_FAILED: &str =
    "📡 Could not download the file because of a network error. Please try again.";

pub fn upload_timeout(secs: u64) -> String {
    format!("⌛ Sending the result took longer than {secs} seconds. Please try again.")
}

pub const UPLOAD_FAILED: &str =
    "📡 Could not send the result because of a network error. Please try again.";

pub fn conversion_timeout(secs: u64) -> String {
    format!(
        "⌛ The conversion did not finish within {} minutes. Try a smaller file or split the PDF into parts.",
        (secs + 59) / 60
    )
}

pub fn conversion_failed(target: TargetKind) -> String {
    format!(
        "❌ Conversion to {} failed. The file may be corrupt or use unsupported features.",
        target.label()
    )
}

pub const NO_TEXT: &str =
    "❌ Could not extract any text. The PDF may be a scan without a text layer.";

pub const APOLOGY: &str = "❌ Something went wrong while handling your request. Please try again.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html(r#"<b>"Q&A"</b>"#), "&lt;b&gt;&quot;Q&amp;A&quot;&lt;/b&gt;");
        assert_eq!(escape_html("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn upload_ack_escapes_name_and_shows_allowance() {
        let text = upload_received("<x>.pdf", 1536, 7, false);
        assert!(text.contains("&lt;x&gt;.pdf"));
        assert!(text.contains("1.5 KB"));
        assert!(text.contains('7'));
        assert!(!text.contains("replaced"));
        assert!(upload_received("a.pdf", 1, 1, true).contains("replaced"));
    }

    #[test]
    fn timeout_and_failure_copy_differ() {
        let timeout = conversion_timeout(600);
        let failure = conversion_failed(TargetKind::Document);
        assert_ne!(timeout, failure);
        assert!(timeout.contains("smaller file"));
        assert!(timeout.contains("10 minutes"));
        assert!(failure.contains("corrupt"));
        assert_ne!(download_timeout(60), DOWNLOAD_FAILED);
        assert_ne!(upload_timeout(60), UPLOAD_FAILED);
    }

    #[test]
    fn rate_limit_window_is_never_zero_minutes() {
        assert!(rate_limited(3, Duration::from_secs(30)).contains("per 30 seconds"));
        assert!(rate_limited(3, Duration::from_secs(1)).contains("per second"));
        assert!(rate_limited(3, Duration::from_secs(60)).contains("per minute"));
        assert!(rate_limited(5, Duration::from_secs(3600)).contains("per 60 minutes"));
        assert!(rate_limited(5, Duration::from_secs(90)).contains("per 90 seconds"));
        assert!(!rate_limited(3, Duration::from_secs(45)).contains("0 minutes"));
    }

    #[test]
    fn size_limits_are_human_readable() {
        assert!(help(20 * 1024 * 1024).contains("20.0 MB"));
        let msg = too_large(25 * 1024 * 1024, 20 * 1024 * 1024);
        assert!(msg.contains("25.0 MB") && msg.contains("20.0 MB"));
    }

    #[test]
    fn converting_status_includes_pages_and_escaped_title() {
        let s = converting(TargetKind::Spreadsheet, 5, Some("Q1 <draft>"));
        assert!(s.contains("Excel"));
        assert!(s.contains('5'));
        assert!(s.contains("Q1 &lt;draft&gt;"));
    }

    #[test]
    fn info_mentions_version() {
        assert!(info().contains(env!("CARGO_PKG_VERSION")));
    }
}
