//! # Thesis RAG
//!
//! A retrieval-augmented question answering service for thesis collections.
//!
//! Thesis RAG ingests plain-text thesis documents, extracts bibliographic
//! metadata, splits the text into overlapping passages, embeds and indexes
//! them in SQLite, and answers natural-language questions with a cited
//! narrative overview synthesized by a generation service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌───────────┐
//! │  Corpus  │──▶│     Pipeline      │──▶│  SQLite    │
//! │  (.txt)  │   │ Meta+Chunk+Embed │   │ Vec+Manif │
//! └──────────┘   └──────────────────┘   └─────┬─────┘
//!                                             │
//!                  ┌──────────────────────────┤
//!                  ▼                          ▼
//!             ┌──────────┐             ┌──────────┐
//!             │   CLI    │             │   HTTP   │
//!             │  (trag)  │             │ /search  │
//!             └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! trag init                  # create database
//! trag ingest                # index new or changed theses
//! trag search "soil erosion" # one-shot retrieval
//! trag serve                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`corpus`] | Corpus filesystem scan |
//! | [`chunk`] | Sentence-window chunking |
//! | [`metadata`] | Bibliographic extraction and normalization |
//! | [`embedding`] | Embedding service client and vector utilities |
//! | [`store`] | Index store adapter (vectors + manifest + recovery) |
//! | [`retrieve`] | Threshold filtering, dedup, backfill |
//! | [`gemini`] | Generation service client |
//! | [`citation`] | Citation renumbering and relocation |
//! | [`answer`] | Prompt-chain orchestration |
//! | [`ingest`] | Ingestion pipeline |
//! | [`server`] | HTTP query API |

pub mod answer;
pub mod chunk;
pub mod citation;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod gemini;
pub mod ingest;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod store;
