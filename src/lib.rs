//! # SciRAG
//!
//! A retrieval-augmented question-answering core for scientific papers.
//!
//! SciRAG discovers papers on arXiv, extracts and chunks their text, embeds
//! the chunks, and indexes them in SQLite. Questions are answered by
//! retrieving the nearest chunks, prompting a hosted LLM with them, and
//! running guardrail checks on both the question and the generated answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │  arXiv   │──▶│        Ingestion          │──▶│  SQLite   │
//! │ discover │   │ extract → chunk → embed  │   │  vectors  │
//! └──────────┘   └──────────────────────────┘   └────┬─────┘
//!                                                    │
//!                ┌──────────────────────────┐        │
//! question ─────▶│          Query            │◀───────┘
//!                │ guard → retrieve → LLM   │──▶ answer + sources
//!                │        → guard           │
//!                └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scirag init                          # create database
//! scirag search "attention"            # discover papers on arXiv
//! scirag ingest 1706.03762             # fetch, chunk, embed, index
//! scirag ask "how does attention work?"
//! scirag stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`arxiv`] | arXiv discovery client |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`chunk`] | Sliding-window word chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index abstraction |
//! | [`sqlite_index`] | SQLite-backed vector index |
//! | [`guardrail`] | Input/output guardrails |
//! | [`retrieve`] | Query-side retrieval |
//! | [`generate`] | LLM provider abstraction and prompting |
//! | [`pipeline`] | Ingestion and answering orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod arxiv;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod guardrail;
pub mod index;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod sqlite_index;
