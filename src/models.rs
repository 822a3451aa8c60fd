//! Core data models used throughout the thesis RAG pipeline.
//!
//! These types represent the corpus files, bibliographic records, passages,
//! and retrieval hits that flow through ingestion and question answering.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A plain-text thesis file discovered in the corpus directory.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    /// File name, used as the document identifier.
    pub document_id: String,
    pub path: PathBuf,
    /// Modification time in epoch seconds, drives incremental indexing.
    pub mtime: i64,
}

/// Canonical bibliographic record stored alongside every passage.
///
/// Every field is always present; the normalizer fills absent values with
/// empty strings before storage. `subjects` is a comma-joined scalar with
/// the main subject first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThesisMeta {
    pub title: String,
    pub author: String,
    pub degree: String,
    pub publication_year: String,
    pub university: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub subjects: String,
    pub call_no: String,
}

/// An overlapping text window of one document, the retrieval unit.
#[derive(Debug, Clone)]
pub struct Passage {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
}

impl Passage {
    /// Globally unique storage id derived from the composite identity.
    pub fn storage_id(&self) -> String {
        format!("{}_chunk_{}", self.document_id, self.chunk_index)
    }
}

/// A nearest-neighbor result: passage, its record, and a dissimilarity
/// score (Euclidean distance, lower = more relevant).
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub meta: ThesisMeta,
    pub distance: f64,
}

/// Entry in the `/search` response document list.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub publication_year: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub file: String,
    pub degree: String,
    pub call_no: String,
    pub subjects: String,
    pub university: String,
}

impl DocumentInfo {
    pub fn from_meta(file: &str, meta: &ThesisMeta) -> Self {
        Self {
            title: meta.title.clone(),
            author: meta.author.clone(),
            publication_year: meta.publication_year.clone(),
            abstract_text: meta.abstract_text.clone(),
            file: file.to_string(),
            degree: meta.degree.clone(),
            call_no: meta.call_no.clone(),
            subjects: meta.subjects.clone(),
            university: meta.university.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_id_composite() {
        let passage = Passage {
            document_id: "erosion_study.txt".to_string(),
            chunk_index: 3,
            text: "body".to_string(),
        };
        assert_eq!(passage.storage_id(), "erosion_study.txt_chunk_3");
    }

    #[test]
    fn test_meta_serializes_abstract_key() {
        let meta = ThesisMeta {
            abstract_text: "A study.".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["abstract"], "A study.");
        assert!(json.get("abstract_text").is_none());
    }
}
