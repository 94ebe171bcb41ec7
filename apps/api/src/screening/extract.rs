//! Document Text Extractor — turns archive entries into normalized candidate text.
//!
//! The format is detected from content (magic bytes), never from the extension
//! alone. Failures are captured per document as an `ExtractionFailure` so one
//! corrupt CV cannot abort the batch.

use std::collections::HashSet;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use encoding_rs::WINDOWS_1252;
use thiserror::Error;
use tracing::warn;
use zip::ZipArchive;

use crate::screening::archive::ArchiveEntry;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionFailure {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unreadable document: {0}")]
    Corrupt(String),

    #[error("Document contains no extractable text")]
    NoText,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

/// One archive entry after extraction. Exists for every eligible entry,
/// whether or not its text could be read.
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    pub candidate_id: String,
    pub filename: String,
    pub byte_len: usize,
    pub text: Result<String, ExtractionFailure>,
}

/// Extracts every entry, keeping archive order and assigning unique candidate ids.
pub fn extract_all(entries: Vec<ArchiveEntry>) -> Vec<CandidateDocument> {
    let mut issued: HashSet<String> = HashSet::new();

    entries
        .into_iter()
        .map(|entry| {
            let candidate_id = unique_id(candidate_stem(&entry.filename), &mut issued);

            let text = extract_text(&entry.bytes);
            if let Err(failure) = &text {
                warn!("Extraction failed for {}: {failure}", entry.path);
            }

            CandidateDocument {
                candidate_id,
                filename: entry.filename,
                byte_len: entry.bytes.len(),
                text,
            }
        })
        .collect()
}

/// Detects the document format from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> Result<DocumentFormat, ExtractionFailure> {
    match infer::get(bytes) {
        Some(kind) => match kind.mime_type() {
            "application/pdf" => Ok(DocumentFormat::Pdf),
            DOCX_MIME | "application/zip" if has_docx_body(bytes) => Ok(DocumentFormat::Docx),
            mime if mime.starts_with("text/") => Ok(DocumentFormat::PlainText),
            mime => Err(ExtractionFailure::UnsupportedFormat(mime.to_string())),
        },
        None if looks_like_text(bytes) => Ok(DocumentFormat::PlainText),
        None => Err(ExtractionFailure::UnsupportedFormat(
            "unrecognized binary content".to_string(),
        )),
    }
}

/// Extracts and normalizes the text of a single document.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionFailure> {
    let raw = match detect_format(bytes)? {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => extract_docx(bytes)?,
        DocumentFormat::PlainText => decode_text(bytes),
    };

    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(ExtractionFailure::NoText);
    }
    Ok(text)
}

/// Collapses all whitespace runs to single spaces and drops control characters.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionFailure> {
    // The PDF parser panics on some malformed inputs; contain it to this document.
    panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| ExtractionFailure::Corrupt("PDF parser aborted".to_string()))?
        .map_err(|e| ExtractionFailure::Corrupt(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionFailure> {
    let docx = panic::catch_unwind(AssertUnwindSafe(|| docx_rs::read_docx(bytes)))
        .map_err(|_| ExtractionFailure::Corrupt("DOCX reader aborted".to_string()))?
        .map_err(|e| ExtractionFailure::Corrupt(e.to_string()))?;

    let mut text = String::new();
    for child in docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            push_paragraph_children(&paragraph.children, &mut text);
            text.push('\n');
        }
    }
    Ok(text)
}

/// Visible run text only. Deleted text and field instructions are skipped.
fn push_paragraph_children(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        RunChild::Text(t) => out.push_str(&t.text),
                        RunChild::Tab(_) | RunChild::Break(_) => out.push(' '),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => push_paragraph_children(&link.children, out),
            _ => {}
        }
    }
}

fn has_docx_body(bytes: &[u8]) -> bool {
    ZipArchive::new(Cursor::new(bytes))
        .map(|archive| archive.file_names().any(|n| n == DOCX_BODY))
        .unwrap_or(false)
}

/// UTF-8 when it decodes cleanly (BOM stripped), Windows-1252 otherwise.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// No binary signature matched; NUL bytes are the remaining tell.
fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0)
}

/// First free id among `stem`, `stem-2`, `stem-3`... compared case-insensitively.
fn unique_id(stem: String, issued: &mut HashSet<String>) -> String {
    let mut candidate = stem.clone();
    let mut n = 1;
    while !issued.insert(candidate.to_lowercase()) {
        n += 1;
        candidate = format!("{stem}-{n}");
    }
    candidate
}

fn candidate_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("candidate")
        .to_string()
}
