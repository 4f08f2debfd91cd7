//! Core data models used throughout docdex.
//!
//! These types represent the documents, text units, and chunks that flow
//! through the indexing pipeline, plus the summary a completed run reports.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// File format recognized by the scanner, derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Plain,
    Docx,
    Pdf,
}

impl FileKind {
    /// Map a path to its file kind, `None` for unsupported extensions.
    pub fn from_path(path: &std::path::Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(FileKind::Plain),
            "docx" => Some(FileKind::Docx),
            "pdf" => Some(FileKind::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Plain => "plain",
            FileKind::Docx => "docx",
            FileKind::Pdf => "pdf",
        }
    }
}

/// Format-specific chunk provenance. Paged formats carry their page
/// coordinates here so consumers pattern-match instead of probing
/// optional metadata keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Plain,
    Docx,
    /// One page of a PDF. `page` is 1-based.
    Pdf { page: u32, total_pages: u32 },
}

impl DocumentKind {
    /// The 1-based page number, present only for paged formats.
    pub fn page(&self) -> Option<u32> {
        match self {
            DocumentKind::Pdf { page, .. } => Some(*page),
            _ => None,
        }
    }
}

/// One physical file discovered by the scanner.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Fingerprint over bytes + mtime; changes iff either changes.
    pub content_hash: String,
    /// Page count, PDF only.
    pub total_pages: Option<u32>,
}

/// One extractable span of a source document: the whole document for
/// plain/DOCX, a single page for PDF. Never persisted.
#[derive(Debug, Clone)]
pub struct TextUnit {
    pub source: PathBuf,
    /// 1-based page number, absent for non-paged formats.
    pub page: Option<u32>,
    pub text: String,
}

/// A bounded window of a text unit — the unit that is embedded and stored.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Deterministic id, a pure function of `(source, page?, chunk_index)`.
    pub id: String,
    pub source: String,
    pub kind: DocumentKind,
    /// 0-based position within the parent text unit.
    pub chunk_index: u32,
    /// Number of chunks produced from the parent text unit.
    pub total_chunks: u32,
    /// Inherited from the parent document; identical across its chunks.
    pub content_hash: String,
    pub text: String,
    pub processed_at: DateTime<Utc>,
}

/// The persisted form of a chunk: the chunk plus its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Counts reported by a completed indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexingSummary {
    /// Documents extracted, chunked, and upserted.
    pub processed: usize,
    /// Documents skipped as unchanged (or vanished between scan and work).
    pub skipped: usize,
    /// Documents that failed extraction, embedding, or upsert.
    pub failed: Vec<PathBuf>,
    /// Total chunks written across all processed documents.
    pub chunks_written: usize,
    /// Store lookups that fell open to reindexing (store unreachable).
    pub fail_open: usize,
}
