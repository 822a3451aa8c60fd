//! Relevance selection over nearest-neighbor pools.
//!
//! The store returns a pool of `pool_size` nearest passages; [`select_hits`]
//! narrows it to the hits worth citing: strictly below the distance
//! threshold, one (best) passage per source document up to `max_docs`, and
//! backfilled with further below-threshold passages when too few distinct
//! documents survive. An empty result means "no relevant information" and
//! callers must treat it as such.

use std::collections::HashSet;

use anyhow::Result;

use crate::config::{Config, RetrievalConfig};
use crate::embedding;
use crate::models::RetrievalHit;
use crate::store::IndexStore;

/// Query the store and select the hits to present to the generator.
pub async fn retrieve(
    store: &IndexStore,
    query_vector: &[f32],
    config: &RetrievalConfig,
) -> Result<Vec<RetrievalHit>> {
    let pool = store.query(query_vector, config.pool_size).await?;
    Ok(select_hits(pool, config))
}

/// Narrow a distance-ascending pool to the final hit list.
///
/// Two passes over the below-threshold hits: first collect the best
/// passage of each distinct document until `max_docs` documents are
/// represented; then, only if fewer distinct documents passed, backfill
/// with remaining hits (repeated documents allowed, repeated passages
/// not) up to `top_n`. Deterministic for identical input.
pub fn select_hits(pool: Vec<RetrievalHit>, config: &RetrievalConfig) -> Vec<RetrievalHit> {
    let relevant: Vec<RetrievalHit> = pool
        .into_iter()
        .filter(|hit| hit.distance < config.distance_threshold)
        .collect();

    let mut seen_docs: HashSet<String> = HashSet::new();
    let mut selected: Vec<RetrievalHit> = Vec::new();

    for hit in &relevant {
        if seen_docs.contains(&hit.document_id) {
            continue;
        }
        seen_docs.insert(hit.document_id.clone());
        selected.push(hit.clone());
        if seen_docs.len() >= config.max_docs {
            break;
        }
    }

    if seen_docs.len() < config.max_docs {
        for hit in &relevant {
            if selected.len() >= config.top_n {
                break;
            }
            let already = selected
                .iter()
                .any(|s| s.document_id == hit.document_id && s.chunk_index == hit.chunk_index);
            if !already {
                selected.push(hit.clone());
            }
        }
    }

    selected
}

/// One-shot retrieval from the command line: embed the question, select
/// hits, print them.
pub async fn run_search(config: &Config, store: &IndexStore, question: &str) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let query_vector = embedding::embed_query(&config.embedding, question).await?;
    let hits = retrieve(store, &query_vector, &config.retrieval).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let title = if hit.meta.title.trim().is_empty() {
            "(untitled)"
        } else {
            hit.meta.title.trim()
        };
        let excerpt: String = hit.text.chars().take(240).collect();

        println!("{}. [{:.4}] {}", i + 1, hit.distance, title);
        println!("    author: {}", hit.meta.author);
        println!("    year: {}", hit.meta.publication_year);
        println!("    file: {} (chunk {})", hit.document_id, hit.chunk_index);
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!();
    }

    Ok(())
}
