//! Per-format text extraction.
//!
//! Each supported [`FileKind`] has an [`Extractor`] that maps a file path
//! to text units: the whole document for plain text and DOCX, one unit per
//! page for PDF. A merely-empty document yields an empty sequence, never
//! an error; a corrupt one fails with [`ExtractError`] and is skipped by
//! the pipeline.

use std::io::Read;
use std::path::Path;

use crate::error::ExtractError;
use crate::models::{FileKind, TextUnit};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection for DOCX containers).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Result of extracting one source document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub units: Vec<TextUnit>,
    /// Page count, paged formats only. Counts all pages, including empty
    /// ones that produced no unit.
    pub total_pages: Option<u32>,
}

/// Maps a file path to its text units. One implementation per file kind.
pub trait Extractor: Send + Sync {
    fn kind(&self) -> FileKind;
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// The extractors a pipeline dispatches to, keyed by file kind.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorSet {
    pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    pub fn for_kind(&self, kind: FileKind) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.kind() == kind)
            .map(|e| e.as_ref())
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PlainExtractor),
            Box::new(DocxExtractor),
            Box::new(PdfExtractor),
        ])
    }
}

/// Plain text and Markdown: the file body is the single text unit.
pub struct PlainExtractor;

impl Extractor for PlainExtractor {
    fn kind(&self) -> FileKind {
        FileKind::Plain
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Extraction {
            units: whole_document_unit(path, text),
            total_pages: None,
        })
    }
}

/// DOCX: `word/document.xml` inside the ZIP container, `<w:t>` runs
/// joined per `<w:p>` paragraph, paragraphs joined with newlines.
pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn kind(&self) -> FileKind {
        FileKind::Docx
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ExtractError::Malformed(format!("not a DOCX container: {}", e)))?;

        let mut doc_xml = Vec::new();
        {
            let entry = archive
                .by_name("word/document.xml")
                .map_err(|_| ExtractError::Malformed("word/document.xml not found".to_string()))?;
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractError::Malformed(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractError::Malformed(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
        }

        let text = docx_paragraphs(&doc_xml)?;
        Ok(Extraction {
            units: whole_document_unit(path, text),
            total_pages: None,
        })
    }
}

fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text_run = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_text_run => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
                b"t" => in_text_run = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Malformed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

/// PDF: one text unit per non-empty page, 1-based page numbers.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn kind(&self) -> FileKind {
        FileKind::Pdf
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = std::fs::read(path)?;
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| ExtractError::Malformed(e.to_string()))?;

        let total_pages = pages.len() as u32;
        let units = pages
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| TextUnit {
                source: path.to_path_buf(),
                page: Some(i as u32 + 1),
                text,
            })
            .collect();

        Ok(Extraction {
            units,
            total_pages: Some(total_pages),
        })
    }
}

fn whole_document_unit(path: &Path, text: String) -> Vec<TextUnit> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![TextUnit {
        source: path.to_path_buf(),
        page: None,
        text,
    }]
}
