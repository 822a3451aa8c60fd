//! Ingestion pipeline orchestration.
//!
//! Coordinates the full indexing flow: corpus scan → metadata extraction →
//! chunking → embedding → storage. Indexing is incremental: a document
//! whose manifest entry matches its modification time is skipped without
//! reading it, and a touched-but-unchanged file (same content hash) only
//! has its manifest entry refreshed. Unreadable files are logged and
//! skipped; embedding failures leave passages stored with vectors pending
//! so recovery can fill them in later.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::corpus;
use crate::embedding;
use crate::metadata;
use crate::models::{CorpusFile, Passage};
use crate::store::IndexStore;

#[derive(Debug, Default)]
pub struct IngestReport {
    pub scanned: usize,
    pub indexed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub passages_written: u64,
}

pub async fn run_ingest(
    config: &Config,
    store: &IndexStore,
    full: bool,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<IngestReport> {
    let mut files = corpus::scan_corpus(config)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }

    let mut report = IngestReport {
        scanned: files.len(),
        ..Default::default()
    };

    if dry_run {
        let mut estimated_passages = 0usize;
        for file in &files {
            let text = std::fs::read_to_string(&file.path).unwrap_or_default();
            estimated_passages += chunk_text(&text, config.chunking.target_words).len();
        }
        println!("ingest (dry-run)");
        println!("  corpus files: {}", files.len());
        println!("  estimated passages: {}", estimated_passages);
        return Ok(report);
    }

    for file in &files {
        if !full && store.is_up_to_date(&file.document_id, file.mtime).await? {
            report.skipped += 1;
            continue;
        }

        let text = match std::fs::read_to_string(&file.path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", file.document_id, e);
                report.failed += 1;
                continue;
            }
        };

        let content_hash = hash_text(&text);
        if !full
            && store
                .content_unchanged(&file.document_id, &content_hash)
                .await?
        {
            // Touched but identical: refresh the manifest, skip re-embedding
            store.touch_manifest(&file.document_id, file.mtime).await?;
            report.skipped += 1;
            continue;
        }

        match index_document(config, store, file, &text, &content_hash).await {
            Ok(passage_count) => {
                report.indexed += 1;
                report.passages_written += passage_count;
            }
            Err(e) => {
                eprintln!("Warning: failed to index {}: {}", file.document_id, e);
                report.failed += 1;
            }
        }
    }

    println!("ingest");
    println!("  scanned: {} corpus files", report.scanned);
    println!("  indexed: {}", report.indexed);
    println!("  skipped (up to date): {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("  passages written: {}", report.passages_written);
    println!("ok");

    Ok(report)
}

/// Re-embed every manifest document when the vector table is empty.
///
/// This models the vector store being reset while the manifest survived.
/// Returns the number of recovered passages; zero when the store is
/// consistent or the manifest is empty.
pub async fn run_recovery(config: &Config, store: &IndexStore) -> Result<u64> {
    if store.vector_count().await? != 0 {
        return Ok(0);
    }
    let manifest = store.manifest_docs().await?;
    if manifest.is_empty() {
        return Ok(0);
    }

    println!(
        "recovery: vector table empty, manifest lists {} documents",
        manifest.len()
    );

    let files = corpus::scan_corpus(config)?;
    let mut recovered = 0u64;

    for (document_id, _mtime) in &manifest {
        let Some(file) = files.iter().find(|f| &f.document_id == document_id) else {
            eprintln!("Warning: missing corpus file for {}, skipping", document_id);
            continue;
        };

        let text = match std::fs::read_to_string(&file.path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", document_id, e);
                continue;
            }
        };

        let content_hash = hash_text(&text);
        match index_document(config, store, file, &text, &content_hash).await {
            Ok(passage_count) => {
                recovered += passage_count;
                println!("  re-indexed {} ({} passages)", document_id, passage_count);
            }
            Err(e) => {
                eprintln!("Warning: failed to recover {}: {}", document_id, e);
            }
        }
    }

    println!("recovery: {} passages restored", recovered);
    Ok(recovered)
}

/// Extract, normalize, chunk, embed, and store one document.
async fn index_document(
    config: &Config,
    store: &IndexStore,
    file: &CorpusFile,
    text: &str,
    content_hash: &str,
) -> Result<u64> {
    let raw = metadata::extract(text);
    let main_subject = metadata::resolve_main_subject(&config.embedding, &raw).await;
    let meta = metadata::normalize(raw, main_subject);

    let passages: Vec<Passage> = chunk_text(text, config.chunking.target_words)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Passage {
            document_id: file.document_id.clone(),
            chunk_index: i as i64,
            text,
        })
        .collect();

    let vectors = if config.embedding.is_enabled() && !passages.is_empty() {
        match embed_passages(config, &passages).await {
            Ok(vectors) => vectors,
            Err(e) => {
                eprintln!(
                    "Warning: embedding failed for {}, vectors pending: {}",
                    file.document_id, e
                );
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    store
        .add_document(
            &file.document_id,
            &meta,
            &passages,
            &vectors,
            file.mtime,
            content_hash,
        )
        .await?;

    Ok(passages.len() as u64)
}

async fn embed_passages(config: &Config, passages: &[Passage]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(passages.len());
    for batch in passages.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
        let batch_vectors = embedding::embed_texts(&config.embedding, &texts).await?;
        vectors.extend(batch_vectors);
    }
    Ok(vectors)
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
