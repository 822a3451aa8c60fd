use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Documents carry the canonical bibliographic record; every field is
    // NOT NULL with an empty-string default so stored records are always
    // schema-complete
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            degree TEXT NOT NULL DEFAULT '',
            publication_year TEXT NOT NULL DEFAULT '',
            university TEXT NOT NULL DEFAULT '',
            abstract TEXT NOT NULL DEFAULT '',
            subjects TEXT NOT NULL DEFAULT '',
            call_no TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passage_vectors (
            passage_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (passage_id) REFERENCES passages(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Side table mapping document ids to last-indexed state; drives
    // incremental indexing and recovery
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifest (
            document_id TEXT PRIMARY KEY,
            mtime INTEGER NOT NULL,
            content_hash TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_document_id ON passages(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_passage_vectors_document_id ON passage_vectors(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
