//! Archive Unpacker — validates an uploaded zip and surfaces its candidate documents.
//!
//! Only entries with a supported document extension are returned. Directories,
//! `__MACOSX` metadata, hidden files and unsupported extensions are skipped and
//! never count toward a task's total. Entry names that would escape the
//! extraction root are skipped with a warning. Decompressed size and entry
//! count are capped to defend against archive bombs.

use std::io::{Cursor, Read};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

/// File extensions a candidate document may carry.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

#[derive(Debug, Error, PartialEq)]
pub enum ArchiveError {
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Archive contains no supported documents (accepted: .pdf, .docx, .txt, .md)")]
    EmptyArchive,

    #[error("Archive too large: {0}")]
    ArchiveTooLarge(String),
}

/// Caps applied while unpacking.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    /// Raw entries in the central directory, directories included.
    pub max_entries: usize,
    /// Sum of decompressed bytes over eligible entries.
    pub max_uncompressed_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 500,
            max_uncompressed_bytes: 200 * 1024 * 1024,
        }
    }
}

/// One eligible document pulled out of the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Sanitized path inside the archive, `/`-separated.
    pub path: String,
    /// Last path component.
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Unpacks `data` in archive iteration order.
pub fn unpack(data: &[u8], limits: &ArchiveLimits) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

    if archive.len() > limits.max_entries {
        return Err(ArchiveError::ArchiveTooLarge(format!(
            "{} entries exceeds the limit of {}",
            archive.len(),
            limits.max_entries
        )));
    }

    let mut entries = Vec::new();
    let mut total_bytes: u64 = 0;

    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| ArchiveError::InvalidArchive(format!("entry {i}: {e}")))?;

        if file.is_dir() {
            continue;
        }

        let raw_name = file.name().to_string();
        let Some(path) = file.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {raw_name:?}");
            continue;
        };
        let path = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !is_eligible(&path) {
            debug!("Skipping ineligible archive entry {path}");
            continue;
        }

        let remaining = limits.max_uncompressed_bytes.saturating_sub(total_bytes);
        if file.size() > remaining {
            return Err(too_large(limits));
        }

        // Read at most one byte past the budget; the declared size is not trusted.
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.take(remaining + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| ArchiveError::InvalidArchive(format!("{path}: {e}")))?;
        if bytes.len() as u64 > remaining {
            return Err(too_large(limits));
        }
        total_bytes += bytes.len() as u64;

        let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
        entries.push(ArchiveEntry {
            path,
            filename,
            bytes,
        });
    }

    if entries.is_empty() {
        return Err(ArchiveError::EmptyArchive);
    }

    Ok(entries)
}

fn too_large(limits: &ArchiveLimits) -> ArchiveError {
    ArchiveError::ArchiveTooLarge(format!(
        "decompressed content exceeds {} bytes",
        limits.max_uncompressed_bytes
    ))
}

fn is_eligible(path: &str) -> bool {
    if path.starts_with("__MACOSX/") {
        return false;
    }
    let filename = path.rsplit('/').next().unwrap_or(path);
    if filename.starts_with('.') {
        return false;
    }
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Builds an in-memory zip. Names ending in `/` become directories.
    pub(crate) fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in files {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_unpack_keeps_archive_order_and_filters() {
        let zip = build_zip(&[
            ("b.txt", b"bob"),
            ("notes.csv", b"x,y"),
            ("cvs/", b""),
            ("cvs/a.PDF", b"%PDF-1.4"),
            ("__MACOSX/cvs/._a.pdf", b"junk"),
            ("cvs/.hidden.txt", b"secret"),
            ("c.docx", b"PK"),
        ]);
        let entries = unpack(&zip, &ArchiveLimits::default()).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["b.txt", "cvs/a.PDF", "c.docx"]);
        assert_eq!(entries[1].filename, "a.PDF");
        assert_eq!(entries[0].bytes, b"bob");
    }

    #[test]
    fn test_unpack_rejects_non_zip() {
        let err = unpack(b"definitely not a zip", &ArchiveLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive(_)));
    }

    #[test]
    fn test_unpack_empty_when_nothing_eligible() {
        let zip = build_zip(&[("readme.csv", b"x"), ("photos/", b"")]);
        assert_eq!(
            unpack(&zip, &ArchiveLimits::default()),
            Err(ArchiveError::EmptyArchive)
        );
    }

    #[test]
    fn test_unpack_skips_path_traversal_entries() {
        let zip = build_zip(&[("../../etc/evil.txt", b"pwn"), ("ok.txt", b"fine")]);
        let entries = unpack(&zip, &ArchiveLimits::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "ok.txt");
    }

    #[test]
    fn test_unpack_caps_entry_count() {
        let zip = build_zip(&[("a.txt", b"a"), ("b.txt", b"b"), ("c.txt", b"c")]);
        let limits = ArchiveLimits {
            max_entries: 2,
            ..ArchiveLimits::default()
        };
        assert!(matches!(
            unpack(&zip, &limits),
            Err(ArchiveError::ArchiveTooLarge(_))
        ));
    }

    #[test]
    fn test_unpack_caps_total_decompressed_size() {
        let big = vec![b'a'; 4096];
        let zip = build_zip(&[("a.txt", &big), ("b.txt", &big)]);
        let limits = ArchiveLimits {
            max_uncompressed_bytes: 6000,
            ..ArchiveLimits::default()
        };
        assert!(matches!(
            unpack(&zip, &limits),
            Err(ArchiveError::ArchiveTooLarge(_))
        ));

        let roomy = ArchiveLimits {
            max_uncompressed_bytes: 8192,
            ..ArchiveLimits::default()
        };
        assert_eq!(unpack(&zip, &roomy).unwrap().len(), 2);
    }
}
