//! HTTP query API.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Answer a question over the indexed corpus |
//! | `GET`  | `/health` | Index totals and liveness |
//!
//! Requests are handled start-to-finish (embed → retrieve → generate →
//! normalize) before the response is written; there is no internal worker
//! pool. Error responses use the JSON contract
//! `{"error":{"code":"...","message":"..."}}`: `bad_request` (400),
//! `embeddings_disabled` (400), `internal` (500). Generation failures are
//! not errors at this level — they arrive embedded in the overview text
//! with the retrieved documents intact.
//!
//! CORS permits all origins, methods, and headers for browser clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{self, AnswerOutcome};
use crate::config::Config;
use crate::corpus;
use crate::embedding;
use crate::models::{DocumentInfo, RetrievalHit};
use crate::retrieve;
use crate::store::IndexStore;

/// Fixed overview when no passage scores below the distance threshold.
pub const NO_RELEVANT_MESSAGE: &str = "No relevant information found for your query.";

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<IndexStore>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, store: IndexStore) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(store),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("thesis RAG server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Embedding failures during query handling: a disabled provider is a
/// configuration problem the caller can act on (400), anything else is
/// internal.
fn classify_embedding_error(err: anyhow::Error) -> AppError {
    let message = err.to_string();
    if message.contains("disabled") {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "embeddings_disabled".to_string(),
            message,
        }
    } else {
        internal(message)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    total_documents: i64,
    total_chunks: i64,
    total_txt_files: i64,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let total_documents = state
        .store
        .document_count()
        .await
        .map_err(|e| internal(e.to_string()))?;
    let total_chunks = state
        .store
        .passage_count()
        .await
        .map_err(|e| internal(e.to_string()))?;
    // A missing corpus directory is not a health failure for the index
    let total_txt_files = corpus::scan_corpus(&state.config)
        .map(|files| files.len() as i64)
        .unwrap_or(0);

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        total_documents,
        total_chunks,
        total_txt_files,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    question: String,
}

#[derive(Serialize)]
struct SearchResponse {
    overview: String,
    documents: Vec<DocumentInfo>,
    related_questions: Vec<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let query_vector = embedding::embed_query(&state.config.embedding, &question)
        .await
        .map_err(classify_embedding_error)?;

    let hits = retrieve::retrieve(&state.store, &query_vector, &state.config.retrieval)
        .await
        .map_err(|e| internal(e.to_string()))?;

    if hits.is_empty() {
        return Ok(Json(no_relevant_response()));
    }

    let outcome = answer::compose_overview(&state.config, &hits, &[question]).await;
    let documents = assemble_documents(&outcome, &hits, state.config.retrieval.top_n);

    Ok(Json(SearchResponse {
        overview: outcome.overview,
        documents,
        related_questions: Vec::new(),
    }))
}

fn no_relevant_response() -> SearchResponse {
    SearchResponse {
        overview: NO_RELEVANT_MESSAGE.to_string(),
        documents: Vec::new(),
        related_questions: Vec::new(),
    }
}

/// Response document list: the presented documents in citation order
/// (position 1..N is what the overview cites), then any further distinct
/// retrieved documents in ascending-distance order, capped at `limit`.
fn assemble_documents(
    outcome: &AnswerOutcome,
    hits: &[RetrievalHit],
    limit: usize,
) -> Vec<DocumentInfo> {
    let mut documents: Vec<DocumentInfo> = outcome
        .documents
        .iter()
        .map(|(file, meta)| DocumentInfo::from_meta(file, meta))
        .collect();

    for hit in hits {
        if documents.len() >= limit {
            break;
        }
        if documents.iter().any(|d| d.file == hit.document_id) {
            continue;
        }
        documents.push(DocumentInfo::from_meta(&hit.document_id, &hit.meta));
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, CitationConfig, CorpusConfig, DbConfig, EmbeddingConfig, GenerationConfig,
        RetrievalConfig, ServerConfig,
    };
    use crate::models::ThesisMeta;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("index.sqlite"),
            },
            corpus: CorpusConfig {
                root: dir.path().join("theses"),
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

    async fn test_state(dir: &tempfile::TempDir) -> AppState {
        let config = test_config(dir);
        let store = IndexStore::open(&config).await.unwrap();
        AppState {
            config: Arc::new(config),
            store: Arc::new(store),
        }
    }

    #[tokio::test]
    async fn test_health_empty_store_reports_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;

        let response = handle_health(State(state)).await.unwrap();
        assert_eq!(response.status, "healthy");
        assert_eq!(response.total_documents, 0);
        assert_eq!(response.total_chunks, 0);
        assert_eq!(response.total_txt_files, 0);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_question() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;

        let result = handle_search(
            State(state),
            Json(SearchRequest {
                question: "   ".to_string(),
            }),
        )
        .await;

        let err = result.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn test_search_reports_disabled_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;

        let result = handle_search(
            State(state),
            Json(SearchRequest {
                question: "soil erosion".to_string(),
            }),
        )
        .await;

        let err = result.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "embeddings_disabled");
    }

    #[test]
    fn test_no_relevant_response_shape() {
        let response = no_relevant_response();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json["overview"],
            "No relevant information found for your query."
        );
        assert_eq!(json["documents"], serde_json::json!([]));
        assert_eq!(json["related_questions"], serde_json::json!([]));
    }

    #[test]
    fn test_assemble_documents_citation_order_first() {
        let meta = |title: &str| ThesisMeta {
            title: title.to_string(),
            ..Default::default()
        };
        let outcome = AnswerOutcome {
            overview: "overview".to_string(),
            documents: vec![
                ("b.txt".to_string(), meta("B")),
                ("a.txt".to_string(), meta("A")),
            ],
        };
        let hits = vec![
            RetrievalHit {
                document_id: "a.txt".to_string(),
                chunk_index: 0,
                text: "a".to_string(),
                meta: meta("A"),
                distance: 0.1,
            },
            RetrievalHit {
                document_id: "c.txt".to_string(),
                chunk_index: 0,
                text: "c".to_string(),
                meta: meta("C"),
                distance: 0.2,
            },
        ];

        let documents = assemble_documents(&outcome, &hits, 10);
        let files: Vec<&str> = documents.iter().map(|d| d.file.as_str()).collect();
        assert_eq!(files, vec!["b.txt", "a.txt", "c.txt"]);
    }

    #[test]
    fn test_classify_embedding_error() {
        let err = classify_embedding_error(anyhow::anyhow!("Embedding provider is disabled"));
        assert_eq!(err.code, "embeddings_disabled");
        let err = classify_embedding_error(anyhow::anyhow!("connection refused"));
        assert_eq!(err.code, "internal");
    }
}
