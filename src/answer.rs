//! Prompt-chain orchestration.
//!
//! Builds the generation prompt from retrieval hits (numbered document
//! list, labeled passage context, instruction block), issues one
//! generation call per prompt step, and runs citation normalization on
//! every step's answer before folding it into the next step's context.
//! Steps are strictly sequential; a step only starts after the previous
//! one is fully normalized.
//!
//! Generation failures never abort the pass: the error text is embedded in
//! the returned overview and the retrieved documents are still reported in
//! presentation order.

use crate::citation;
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::models::{RetrievalHit, ThesisMeta};

/// Fixed response when every supplied hit is effectively empty.
pub const NO_RESULTS_MESSAGE: &str = "No results found for your query.";

/// Final overview plus the presented documents in citation order.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub overview: String,
    /// Presented documents reordered so position 1..N matches the
    /// citation numbers in `overview`.
    pub documents: Vec<(String, ThesisMeta)>,
}

/// Run the prompt chain over the retrieved hits.
pub async fn compose_overview(
    config: &Config,
    hits: &[RetrievalHit],
    prompts: &[String],
) -> AnswerOutcome {
    if hits.is_empty() || all_effectively_empty(hits) {
        return AnswerOutcome {
            overview: NO_RESULTS_MESSAGE.to_string(),
            documents: Vec::new(),
        };
    }

    let mut documents = presented_documents(hits, config.citation.context_docs);

    let client = match GeminiClient::from_config(&config.generation) {
        Ok(client) => client,
        Err(e) => {
            return AnswerOutcome {
                overview: format!("[generation error: {}]", e),
                documents,
            }
        }
    };

    let mut answer = String::new();

    for prompt_text in prompts {
        let context = build_context(&documents, hits, &answer);
        let full_prompt = format!("{}Question: {}\nAnswer: ", context, prompt_text);

        match client.generate(&full_prompt).await {
            Ok(raw) => {
                let normalized =
                    citation::normalize_answer(&raw, documents.len(), &config.citation);
                documents = reorder_documents(documents, &normalized.canonical_order);
                answer = normalized.text;
            }
            Err(e) => {
                answer = format!("[generation error: {}]", e);
                break;
            }
        }
    }

    AnswerOutcome {
        overview: answer,
        documents,
    }
}

/// Reorder the presented documents so position 1..N matches the
/// normalized citation numbers.
fn reorder_documents(
    documents: Vec<(String, ThesisMeta)>,
    canonical_order: &[usize],
) -> Vec<(String, ThesisMeta)> {
    canonical_order
        .iter()
        .map(|&old| documents[old].clone())
        .collect()
}

/// True when every hit has blank passage text or an entirely placeholder
/// record; the caller short-circuits to [`NO_RESULTS_MESSAGE`] without a
/// generation call.
fn all_effectively_empty(hits: &[RetrievalHit]) -> bool {
    hits.iter().all(|hit| {
        hit.text.trim().is_empty()
            || (is_placeholder(&hit.meta.title, "[Unknown Title]")
                && is_placeholder(&hit.meta.author, "[Unknown Author]")
                && is_placeholder(&hit.meta.publication_year, "[Unknown Year]"))
    })
}

fn is_placeholder(value: &str, placeholder: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == placeholder
}

/// Distinct source documents in first-appearance-in-retrieval order,
/// capped at `context_docs`.
fn presented_documents(hits: &[RetrievalHit], context_docs: usize) -> Vec<(String, ThesisMeta)> {
    let mut documents: Vec<(String, ThesisMeta)> = Vec::new();
    for hit in hits {
        if documents.iter().any(|(id, _)| id == &hit.document_id) {
            continue;
        }
        documents.push((hit.document_id.clone(), hit.meta.clone()));
        if documents.len() >= context_docs {
            break;
        }
    }
    documents
}

/// Assemble the context block: numbered document list, labeled passages,
/// and either the instruction block (first step) or the running answer
/// (later steps).
fn build_context(
    documents: &[(String, ThesisMeta)],
    hits: &[RetrievalHit],
    prior_answer: &str,
) -> String {
    let doc_lines: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, (file, meta))| {
            format!(
                "[{}] Title: {}\n    Author: {}\n    Year: {}\n    File: {}",
                i + 1,
                or_unknown(&meta.title),
                or_unknown(&meta.author),
                or_unknown(&meta.publication_year),
                file,
            )
        })
        .collect();
    let doc_block = format!(
        "Top {} relevant documents found (numbered for reference):\n{}\n\n",
        documents.len(),
        doc_lines.join("\n")
    );

    let number_of = |document_id: &str| -> Option<usize> {
        documents
            .iter()
            .position(|(id, _)| id == document_id)
            .map(|i| i + 1)
    };

    let chunk_lines: Vec<String> = hits
        .iter()
        .filter_map(|hit| {
            number_of(&hit.document_id).map(|num| {
                format!(
                    "[{}] From {} (chunk {}): {}",
                    num, hit.document_id, hit.chunk_index, hit.text
                )
            })
        })
        .collect();

    let mut context = format!(
        "{}Context: {}\n\nWhen answering, please reference the relevant thesis by its number in \
         square brackets, e.g., [1], [2], etc., to indicate the source of each point.\n\n",
        doc_block,
        chunk_lines.join("\n\n")
    );

    if prior_answer.is_empty() {
        context.push_str(&instruction_block(documents.len()));
    } else {
        context.push_str(prior_answer);
        context.push_str("\n\n");
    }

    context
}

fn instruction_block(doc_count: usize) -> String {
    format!(
        "Synthesize the findings from the top {count} relevant theses in response to the \
         following question. Group your answer by key themes or outcomes relevant to the \
         question. Write in plain text, paragraph style, without bullet points, asterisks, or \
         markdown formatting. At the end of each paragraph, place in square brackets the \
         number(s) of the most relevant thesis or theses (from the list above) that support \
         the information in that paragraph, e.g., [1] or [2][3]. Do not place references \
         anywhere else. Do not default to [1] for every paragraph—use the correct number(s) \
         for each paragraph based on the supporting evidence. You must reference all top \
         {count} unique theses at least once in your answer, distributing them across the \
         overview. If a thesis is not referenced, add it to a relevant paragraph. Conclude \
         with a summary paragraph that synthesizes the findings. After the summary, \
         concatenate all referenced thesis numbers in square brackets (e.g., [1][2][3][4][5]), \
         with no explanatory sentence or line break. Highlight relationships, causal links, \
         and actionable insights. ",
        count = doc_count
    )
}

fn or_unknown(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "[Unknown]"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, CitationConfig, CorpusConfig, DbConfig, EmbeddingConfig, GenerationConfig,
        RetrievalConfig, ServerConfig,
    };

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: "/tmp/unused.sqlite".into(),
            },
            corpus: CorpusConfig {
                root: "/tmp/unused".into(),
                include_globs: vec!["**/*.txt".to_string()],
                exclude_globs: vec![],
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            citation: CitationConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
        }
    }

    fn hit(doc: &str, chunk: i64, title: &str) -> RetrievalHit {
        RetrievalHit {
            document_id: doc.to_string(),
            chunk_index: chunk,
            text: format!("passage {} of {}", chunk, doc),
            meta: ThesisMeta {
                title: title.to_string(),
                author: "Author".to_string(),
                publication_year: "2019".to_string(),
                ..Default::default()
            },
            distance: 0.5,
        }
    }

    #[tokio::test]
    async fn test_empty_hits_short_circuit() {
        let outcome = compose_overview(&test_config(), &[], &["question".to_string()]).await;
        assert_eq!(outcome.overview, NO_RESULTS_MESSAGE);
        assert!(outcome.documents.is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_hits_short_circuit() {
        let hits = vec![RetrievalHit {
            document_id: "a.txt".to_string(),
            chunk_index: 0,
            text: "some text".to_string(),
            meta: ThesisMeta {
                title: "[Unknown Title]".to_string(),
                author: "".to_string(),
                publication_year: "[Unknown Year]".to_string(),
                ..Default::default()
            },
            distance: 0.5,
        }];
        let outcome = compose_overview(&test_config(), &hits, &["question".to_string()]).await;
        assert_eq!(outcome.overview, NO_RESULTS_MESSAGE);
        assert!(outcome.documents.is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key_embeds_error_and_keeps_documents() {
        std::env::remove_var("GEMINI_API_KEY");
        let hits = vec![hit("a.txt", 0, "Thesis A"), hit("b.txt", 0, "Thesis B")];
        let outcome = compose_overview(&test_config(), &hits, &["question".to_string()]).await;
        assert!(outcome.overview.starts_with("[generation error:"));
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.documents[0].0, "a.txt");
    }

    #[test]
    fn test_reorder_documents_follows_canonical_order() {
        let documents = vec![
            ("a.txt".to_string(), ThesisMeta::default()),
            ("b.txt".to_string(), ThesisMeta::default()),
            ("c.txt".to_string(), ThesisMeta::default()),
        ];
        // First-appearance order {2,1,3} over presented {1,2,3}
        let reordered = reorder_documents(documents, &[1, 0, 2]);
        let files: Vec<&str> = reordered.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(files, vec!["b.txt", "a.txt", "c.txt"]);
    }

    #[test]
    fn test_presented_documents_dedup_and_cap() {
        let hits = vec![
            hit("a.txt", 0, "A"),
            hit("a.txt", 1, "A"),
            hit("b.txt", 0, "B"),
            hit("c.txt", 0, "C"),
        ];
        let documents = presented_documents(&hits, 2);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].0, "a.txt");
        assert_eq!(documents[1].0, "b.txt");
    }

    #[test]
    fn test_build_context_numbers_documents_and_chunks() {
        let hits = vec![
            hit("a.txt", 0, "Thesis A"),
            hit("b.txt", 2, "Thesis B"),
            hit("c.txt", 0, "Thesis C"),
        ];
        let documents = presented_documents(&hits, 2);
        let context = build_context(&documents, &hits, "");

        assert!(context.contains("Top 2 relevant documents"));
        assert!(context.contains("[1] Title: Thesis A"));
        assert!(context.contains("[2] Title: Thesis B"));
        // Hits from documents outside the presented set are omitted
        assert!(!context.contains("Thesis C"));
        assert!(context.contains("[2] From b.txt (chunk 2):"));
        // First step carries the instruction block
        assert!(context.contains("summary paragraph"));
    }

    #[test]
    fn test_build_context_folds_prior_answer() {
        let hits = vec![hit("a.txt", 0, "Thesis A")];
        let documents = presented_documents(&hits, 5);
        let context = build_context(&documents, &hits, "Earlier answer text.[1]");

        assert!(context.contains("Earlier answer text.[1]"));
        assert!(!context.contains("Synthesize the findings"));
    }

    #[test]
    fn test_unknown_fields_render_placeholder() {
        let hits = vec![hit("a.txt", 0, "")];
        let documents = presented_documents(&hits, 5);
        let context = build_context(&documents, &hits, "");
        assert!(context.contains("[1] Title: [Unknown]"));
    }
}
