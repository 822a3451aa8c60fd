//! Index store adapter: passages, vectors, metadata, and the manifest.
//!
//! [`IndexStore`] wraps the SQLite-backed vector store behind the narrow
//! add/query/count contract the pipeline needs, and owns the manifest side
//! table that records each document's last-indexed modification time. The
//! manifest makes re-indexing incremental (unchanged documents are skipped
//! without computing embeddings) and drives recovery when the vector table
//! was lost but the manifest survived.
//!
//! The store is explicitly constructed with [`IndexStore::open`] and passed
//! by reference to the ingestor, retriever, and server; there is no global
//! handle.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::migrate;
use crate::models::{Passage, RetrievalHit, ThesisMeta};

pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Open (and create if missing) the database, running migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// True when the manifest already records this document at this
    /// modification time; the caller skips the document entirely.
    pub async fn is_up_to_date(&self, document_id: &str, mtime: i64) -> Result<bool> {
        let recorded: Option<i64> =
            sqlx::query_scalar("SELECT mtime FROM manifest WHERE document_id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(recorded == Some(mtime))
    }

    /// True when the manifest records the same content hash, meaning the
    /// file was touched but its text is unchanged.
    pub async fn content_unchanged(&self, document_id: &str, content_hash: &str) -> Result<bool> {
        let recorded: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM manifest WHERE document_id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(recorded.as_deref() == Some(content_hash) && !content_hash.is_empty())
    }

    /// Record a new mtime for an already-indexed, unchanged document.
    pub async fn touch_manifest(&self, document_id: &str, mtime: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE manifest SET mtime = ?, updated_at = ? WHERE document_id = ?")
            .bind(mtime)
            .bind(now)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace a document's entries: superseded passages and vectors are
    /// deleted in the same transaction that inserts the new ones, so
    /// re-indexing a changed document never duplicates old entries. The
    /// manifest row is upserted last; vectors may be empty when embedding
    /// is unavailable (recovery re-embeds later).
    pub async fn add_document(
        &self,
        document_id: &str,
        meta: &ThesisMeta,
        passages: &[Passage],
        vectors: &[Vec<f32>],
        mtime: i64,
        content_hash: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM passage_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM passages WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, author, degree, publication_year, university, abstract, subjects, call_no)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                degree = excluded.degree,
                publication_year = excluded.publication_year,
                university = excluded.university,
                abstract = excluded.abstract,
                subjects = excluded.subjects,
                call_no = excluded.call_no
            "#,
        )
        .bind(document_id)
        .bind(&meta.title)
        .bind(&meta.author)
        .bind(&meta.degree)
        .bind(&meta.publication_year)
        .bind(&meta.university)
        .bind(&meta.abstract_text)
        .bind(&meta.subjects)
        .bind(&meta.call_no)
        .execute(&mut *tx)
        .await?;

        for passage in passages {
            sqlx::query(
                "INSERT INTO passages (id, document_id, chunk_index, text) VALUES (?, ?, ?, ?)",
            )
            .bind(passage.storage_id())
            .bind(&passage.document_id)
            .bind(passage.chunk_index)
            .bind(&passage.text)
            .execute(&mut *tx)
            .await?;
        }

        for (passage, vector) in passages.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO passage_vectors (passage_id, document_id, embedding) VALUES (?, ?, ?)",
            )
            .bind(passage.storage_id())
            .bind(&passage.document_id)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO manifest (document_id, mtime, content_hash, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                mtime = excluded.mtime,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(mtime)
        .bind(content_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Nearest-neighbor query: the `k` passages closest to `vector` by
    /// Euclidean distance, ascending. Distances are computed in Rust over
    /// the stored BLOBs.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        let rows = sqlx::query(
            r#"
            SELECT pv.embedding, p.document_id, p.chunk_index, p.text,
                   d.title, d.author, d.degree, d.publication_year,
                   d.university, d.abstract, d.subjects, d.call_no
            FROM passage_vectors pv
            JOIN passages p ON p.id = pv.passage_id
            JOIN documents d ON d.id = p.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<RetrievalHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = embedding::blob_to_vec(&blob);
                RetrievalHit {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    meta: ThesisMeta {
                        title: row.get("title"),
                        author: row.get("author"),
                        degree: row.get("degree"),
                        publication_year: row.get("publication_year"),
                        university: row.get("university"),
                        abstract_text: row.get("abstract"),
                        subjects: row.get("subjects"),
                        call_no: row.get("call_no"),
                    },
                    distance: embedding::l2_distance(vector, &stored),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// The stored record for one document, if indexed.
    pub async fn document_meta(&self, document_id: &str) -> Result<Option<ThesisMeta>> {
        let row = sqlx::query(
            r#"
            SELECT title, author, degree, publication_year, university,
                   abstract, subjects, call_no
            FROM documents WHERE id = ?
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ThesisMeta {
            title: row.get("title"),
            author: row.get("author"),
            degree: row.get("degree"),
            publication_year: row.get("publication_year"),
            university: row.get("university"),
            abstract_text: row.get("abstract"),
            subjects: row.get("subjects"),
            call_no: row.get("call_no"),
        }))
    }

    pub async fn vector_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passage_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn passage_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn document_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn manifest_len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM manifest")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Every manifest entry, in document-id order. Drives recovery.
    pub async fn manifest_docs(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT document_id, mtime FROM manifest ORDER BY document_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("document_id"), row.get("mtime")))
            .collect())
    }
}
