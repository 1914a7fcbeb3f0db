//! End-to-end conversion tests against the real pdfium library.
//!
//! pdfium is located (or downloaded on first run) exactly as the binary does
//! it. The tests are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Extra PDFs dropped into `./test_cases/` are converted to DOCX and XLSX by
//! `test_every_case_converts`.

use calamine::{open_workbook, Reader, Xlsx};
use pdf_convert_bot::{
    engine, ArtifactDetail, ConversionGateway, ConversionJob, ConversionOutcome, DocumentOptions,
    PdfiumEngine, TargetKind,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn pdfium() -> PdfiumEngine {
    let library = match engine::locate() {
        Some(path) => path,
        None => engine::provision(None).expect("pdfium could not be provisioned"),
    };
    let engine = PdfiumEngine::new(library);
    engine.check().expect("pdfium failed to load");
    engine
}

fn gateway() -> ConversionGateway<PdfiumEngine> {
    ConversionGateway::new(Arc::new(pdfium()), Duration::from_secs(120))
}

/// A small but well-formed PDF: one page per entry, one Helvetica text line
/// per `(x, y, text)` triple.
fn write_pdf(path: &Path, pages: &[Vec<(f32, f32, &str)>]) {
    let page_count = pages.len();
    // Objects: 1 catalog, 2 page tree, 3 font, then (page, content) pairs.
    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        page_count
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());
    for (i, lines) in pages.iter().enumerate() {
        let content: String = lines
            .iter()
            .map(|(x, y, text)| {
                let escaped = text
                    .replace('\\', "\\\\")
                    .replace('(', "\\(")
                    .replace(')', "\\)");
                format!("BT /F1 12 Tf {x} {y} Td ({escaped}) Tj ET\n")
            })
            .collect();
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    std::fs::write(path, out).expect("write fixture");
}

fn prose_pdf(dir: &Path) -> PathBuf {
    let path = dir.join("prose.pdf");
    write_pdf(
        &path,
        &[
            vec![
                (72.0, 720.0, "Quarterly report"),
                (72.0, 690.0, "Revenue grew in every region."),
            ],
            vec![(72.0, 720.0, "Second page text.")],
        ],
    );
    path
}

fn table_pdf(dir: &Path) -> PathBuf {
    let path = dir.join("table.pdf");
    let mut lines = vec![(72.0, 740.0, "Price list")];
    for (row, cells) in [["Item", "Qty", "Price"], ["Tea", "2", "4"], ["Cake", "1", "6"]]
        .iter()
        .enumerate()
    {
        let y = 700.0 - 20.0 * row as f32;
        for (col, cell) in cells.iter().enumerate() {
            lines.push((72.0 + 180.0 * col as f32, y, *cell));
        }
    }
    write_pdf(&path, &[vec![(72.0, 720.0, "Cover page")], lines]);
    path
}

fn zip_entry(path: &Path, name: &str) -> String {
    let file = std::fs::File::open(path).expect("open docx");
    let mut archive = zip::ZipArchive::new(file).expect("docx is a zip archive");
    let mut entry = archive.by_name(name).expect("entry present");
    let mut xml = String::new();
    entry.read_to_string(&mut xml).expect("entry is UTF-8");
    xml
}

fn sheet_names(path: &Path) -> Vec<String> {
    let workbook: Xlsx<_> = open_workbook(path).expect("open xlsx");
    workbook.sheet_names()
}

async fn convert(
    gw: &ConversionGateway<PdfiumEngine>,
    source: &Path,
    output: PathBuf,
    target: TargetKind,
) -> pdf_convert_bot::Artifact {
    let job = ConversionJob {
        source: source.to_path_buf(),
        output,
        target,
        document: DocumentOptions::default(),
    };
    match gw.run(job).await {
        ConversionOutcome::Success(artifact) => artifact,
        other => panic!("{} → {target}: unexpected outcome {other:?}", source.display()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_reads_page_count() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = prose_pdf(dir.path());

    match gateway().inspect(&pdf).await {
        ConversionOutcome::Success(meta) => assert_eq!(meta.page_count, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plain_text_keeps_page_order() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = prose_pdf(dir.path());
    let out = dir.path().join("prose.txt");

    let artifact = convert(&gateway(), &pdf, out.clone(), TargetKind::PlainText).await;
    assert_eq!(artifact.pages, 2);

    let text = std::fs::read_to_string(&out).unwrap();
    let first = text.find("Quarterly report").expect("page 1 text");
    let second = text.find("Second page text.").expect("page 2 text");
    assert!(first < second);
    assert!(text.contains("\n\n"), "pages are separated by a blank line");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_document_contains_page_text() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = prose_pdf(dir.path());
    let out = dir.path().join("prose.docx");

    let artifact = convert(&gateway(), &pdf, out.clone(), TargetKind::Document).await;
    assert_eq!(artifact.detail, ArtifactDetail::Document);

    let xml = zip_entry(&out, "word/document.xml");
    assert!(xml.contains("Revenue grew in every region."));
    assert!(xml.contains("Second page text."));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spreadsheet_is_readable() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = table_pdf(dir.path());
    let out = dir.path().join("table.xlsx");

    let artifact = convert(&gateway(), &pdf, out.clone(), TargetKind::Spreadsheet).await;
    let names = sheet_names(&out);
    println!("sheets: {names:?} detail: {:?}", artifact.detail);
    match artifact.detail {
        ArtifactDetail::Spreadsheet { tables: 0 } => assert_eq!(names, vec!["Text"]),
        ArtifactDetail::Spreadsheet { .. } => {
            assert_eq!(names[0], "All tables");
            assert!(names.iter().any(|n| n == "Page 2"));
        }
        other => panic!("unexpected detail {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_garbage_is_rejected_as_corrupt() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("garbage.pdf");
    std::fs::write(&pdf, b"%PDF-1.7\nthis is not really a pdf").unwrap();

    match gateway().inspect(&pdf).await {
        ConversionOutcome::Failure(e) => assert!(e.is_input_problem(), "{e}"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_case_converts() {
    e2e_skip_unless_enabled!();
    let Ok(entries) = std::fs::read_dir(test_cases_dir()) else {
        println!("SKIP: no test_cases/ directory");
        return;
    };
    let cases: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|x| x.eq_ignore_ascii_case("pdf")))
        .collect();
    if cases.is_empty() {
        println!("SKIP: no PDFs in test_cases/");
        return;
    }

    let gw = gateway();
    let out = tempfile::tempdir().unwrap();
    for case in cases {
        let stem = case.file_stem().unwrap().to_string_lossy().to_string();
        for target in [TargetKind::Document, TargetKind::Spreadsheet] {
            let output = out.path().join(format!("{stem}.{}", target.extension()));
            let artifact = convert(&gw, &case, output.clone(), target).await;
            println!("{stem} → {target}: {} pages", artifact.pages);
            assert!(std::fs::metadata(&output).unwrap().len() > 0);
        }
    }
}
