//! Indexing pipeline orchestration.
//!
//! Coordinates the full pass over a knowledge-base tree: scan → per-file
//! change detection → extraction → chunking → identity → embedded upsert.
//! Files are mutually independent and run on a bounded worker pool; within
//! one file, chunk order is preserved and the upsert batch is atomic.
//!
//! Per-file failures (corrupt documents, write errors, timeouts) are
//! recorded and the run continues; only an unreadable root or an invalid
//! configuration aborts a run. Aborting mid-run leaves already-committed
//! documents consistent — each document's batch commits or doesn't.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::chunker::Chunker;
use crate::config::{self, Config};
use crate::detect::{self, LookupOutcome};
use crate::embed::EmbeddingProvider;
use crate::error::{ConfigError, EmbedError, ExtractError, PipelineError, StoreError};
use crate::extract::ExtractorSet;
use crate::ident;
use crate::models::{
    Chunk, DocumentKind, FileKind, IndexRecord, IndexingSummary, SourceDocument, TextUnit,
};
use crate::scanner::{self, ScannedFile};
use crate::store::IndexStore;

/// The orchestrator. Collaborators are injected; nothing here constructs
/// an embedding backend or a store on its own.
pub struct Pipeline {
    ctx: WorkerCtx,
    workers: usize,
    scan: config::ScanConfig,
}

#[derive(Clone)]
struct WorkerCtx {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractors: Arc<ExtractorSet>,
    chunker: Chunker,
    embed_batch: usize,
    file_timeout: Duration,
}

/// Per-file failure, isolated from the rest of the run.
#[derive(Error, Debug)]
enum FileError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

enum FileOutcome {
    Indexed { chunks: usize, fail_open: bool },
    Skipped,
    Failed,
}

impl Pipeline {
    /// Build a pipeline over the given collaborators. Rejects invalid
    /// configuration before any file is touched.
    pub fn new(
        config: &Config,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, ConfigError> {
        config::validate(config)?;
        Ok(Self {
            ctx: WorkerCtx {
                store,
                embedder,
                extractors: Arc::new(ExtractorSet::default()),
                chunker: Chunker::new(
                    config.chunking.window_chars,
                    config.chunking.overlap_chars,
                ),
                embed_batch: config.embedding.batch_size,
                file_timeout: Duration::from_secs(config.runtime.file_timeout_secs),
            },
            workers: config.runtime.workers,
            scan: config.scan.clone(),
        })
    }

    /// Replace the extractor set, e.g. with test doubles.
    pub fn with_extractors(mut self, extractors: ExtractorSet) -> Self {
        self.ctx.extractors = Arc::new(extractors);
        self
    }

    /// Run one indexing pass over `root`.
    pub async fn run(&self, root: &Path) -> Result<IndexingSummary, PipelineError> {
        let files = scanner::scan(root, &self.scan)?;
        tracing::info!(root = %root.display(), files = files.len(), "indexing run started");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(files.len());

        for file in files {
            let semaphore = semaphore.clone();
            let ctx = self.ctx.clone();
            let path = file.path.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                index_file(&ctx, &file).await
            });
            handles.push((path, handle));
        }

        let mut summary = IndexingSummary::default();
        for (path, handle) in handles {
            match handle.await {
                Ok(FileOutcome::Indexed { chunks, fail_open }) => {
                    summary.processed += 1;
                    summary.chunks_written += chunks;
                    if fail_open {
                        summary.fail_open += 1;
                    }
                }
                Ok(FileOutcome::Skipped) => summary.skipped += 1,
                Ok(FileOutcome::Failed) => summary.failed.push(path),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "indexing task panicked");
                    summary.failed.push(path);
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            chunks = summary.chunks_written,
            "indexing run finished"
        );
        Ok(summary)
    }
}

async fn index_file(ctx: &WorkerCtx, file: &ScannedFile) -> FileOutcome {
    let decision = match detect::needs_indexing(ctx.store.as_ref(), &file.path).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(path = %file.path.display(), error = %e, "could not fingerprint file");
            return FileOutcome::Failed;
        }
    };

    if !decision.reindex {
        tracing::debug!(path = %file.path.display(), outcome = ?decision.outcome, "skipping");
        return FileOutcome::Skipped;
    }

    let fail_open = decision.outcome == LookupOutcome::StoreUnavailable;
    let fingerprint = match decision.fingerprint {
        Some(fingerprint) => fingerprint,
        // reindex without a fingerprint cannot happen; treat defensively
        // as a failed file rather than panicking a worker.
        None => return FileOutcome::Failed,
    };

    match tokio::time::timeout(ctx.file_timeout, index_dirty_file(ctx, file, fingerprint)).await {
        Ok(Ok(chunks)) => {
            tracing::debug!(path = %file.path.display(), chunks, "indexed");
            FileOutcome::Indexed { chunks, fail_open }
        }
        Ok(Err(e)) => {
            tracing::warn!(path = %file.path.display(), error = %e, "indexing failed");
            FileOutcome::Failed
        }
        Err(_) => {
            tracing::warn!(path = %file.path.display(), "indexing timed out");
            FileOutcome::Failed
        }
    }
}

/// Extract, chunk, embed, and upsert one dirty file. The fingerprint was
/// computed by the detector; it is stamped onto every chunk so all chunks
/// of this document version share one hash.
async fn index_dirty_file(
    ctx: &WorkerCtx,
    file: &ScannedFile,
    fingerprint: String,
) -> Result<usize, FileError> {
    let extraction = {
        let extractors = ctx.extractors.clone();
        let kind = file.kind;
        let path = file.path.clone();
        tokio::task::spawn_blocking(move || match extractors.for_kind(kind) {
            Some(extractor) => extractor.extract(&path),
            None => Err(ExtractError::Malformed(format!(
                "no extractor registered for {}",
                kind.as_str()
            ))),
        })
        .await
        .map_err(|e| FileError::Aborted(e.to_string()))??
    };

    let document = SourceDocument {
        path: file.path.clone(),
        kind: file.kind,
        content_hash: fingerprint,
        total_pages: extraction.total_pages,
    };

    let chunks = chunk_document(ctx, &document, &extraction.units);
    if chunks.is_empty() {
        tracing::debug!(path = %document.path.display(), "no extractable text");
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(ctx.embed_batch) {
        embeddings.extend(ctx.embedder.embed(batch).await?);
    }
    if embeddings.len() != chunks.len() {
        return Err(FileError::Embed(EmbedError::InvalidResponse(format!(
            "expected {} vectors, got {}",
            chunks.len(),
            embeddings.len()
        ))));
    }

    let records: Vec<IndexRecord> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| IndexRecord { chunk, embedding })
        .collect();

    let written = ctx.store.upsert(&records).await?;
    Ok(written)
}

/// Chunk every text unit of a document, assigning deterministic ids and
/// per-unit `total_chunks`.
fn chunk_document(ctx: &WorkerCtx, document: &SourceDocument, units: &[TextUnit]) -> Vec<Chunk> {
    let source = ident::normalize(&document.path);
    let processed_at = chrono::Utc::now();
    let mut chunks = Vec::new();

    for unit in units {
        let windows = ctx.chunker.split(&unit.text);
        let total_chunks = windows.len() as u32;
        for (index, text) in windows.into_iter().enumerate() {
            let index = index as u32;
            let kind = match document.kind {
                FileKind::Plain => DocumentKind::Plain,
                FileKind::Docx => DocumentKind::Docx,
                FileKind::Pdf => DocumentKind::Pdf {
                    page: unit.page.unwrap_or(1),
                    total_pages: document.total_pages.unwrap_or(1),
                },
            };
            chunks.push(Chunk {
                id: ident::assign(&unit.source, unit.page, index),
                source: source.clone(),
                kind,
                chunk_index: index,
                total_chunks,
                content_hash: document.content_hash.clone(),
                text,
                processed_at,
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn worker_ctx() -> WorkerCtx {
        WorkerCtx {
            store: Arc::new(crate::store::MemoryStore::new()),
            embedder: Arc::new(StubEmbedder),
            extractors: Arc::new(ExtractorSet::default()),
            chunker: Chunker::new(1000, 200),
            embed_batch: 32,
            file_timeout: Duration::from_secs(10),
        }
    }

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    #[test]
    fn chunk_document_stamps_shared_hash_and_indices() {
        let ctx = worker_ctx();
        let document = SourceDocument {
            path: PathBuf::from("/kb/long.txt"),
            kind: FileKind::Plain,
            content_hash: "fingerprint".to_string(),
            total_pages: None,
        };
        let text: String = "y".repeat(2500);
        let units = vec![TextUnit {
            source: document.path.clone(),
            page: None,
            text,
        }];

        let chunks = chunk_document(&ctx, &document, &units);
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.total_chunks, 3);
            assert_eq!(chunk.content_hash, "fingerprint");
            assert_eq!(chunk.kind, DocumentKind::Plain);
        }
    }

    #[test]
    fn chunk_document_pdf_pages_get_page_coordinates() {
        let ctx = worker_ctx();
        let document = SourceDocument {
            path: PathBuf::from("/kb/r.pdf"),
            kind: FileKind::Pdf,
            content_hash: "h".to_string(),
            total_pages: Some(2),
        };
        let units = vec![
            TextUnit {
                source: document.path.clone(),
                page: Some(1),
                text: "page one".to_string(),
            },
            TextUnit {
                source: document.path.clone(),
                page: Some(2),
                text: "page two".to_string(),
            },
        ];

        let chunks = chunk_document(&ctx, &document, &units);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, DocumentKind::Pdf { page: 1, total_pages: 2 });
        assert_eq!(chunks[1].kind, DocumentKind::Pdf { page: 2, total_pages: 2 });
        // Per-unit indices restart at zero; ids must still differ.
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 0);
        assert_ne!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn chunk_document_empty_units_yield_nothing() {
        let ctx = worker_ctx();
        let document = SourceDocument {
            path: PathBuf::from("/kb/empty.txt"),
            kind: FileKind::Plain,
            content_hash: "h".to_string(),
            total_pages: None,
        };
        assert!(chunk_document(&ctx, &document, &[]).is_empty());
    }
}
