//! # Proposal Writer
//!
//! Retrieval and review backend for the Brainforge proposal writer agent.
//!
//! Case studies are chunked, embedded and stored in SQLite. Requests are
//! answered with a filtered hybrid search (vector similarity plus FTS5
//! BM25, fused with Reciprocal Rank Fusion), and drafts pass through a
//! rule-based evaluator that allows at most one revision.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Case study  │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │  + metadata  │   │ + metrics    │   │ FTS5+Vec  │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                           hybrid search ◀───┘
//!                                 │
//!                                 ▼
//!                    ┌────────────────────────┐
//!                    │ generate → review →    │
//!                    │ regenerate (at most 1) │
//!                    └────────────────────────┘
//! ```
//!
//! The storage-agnostic algorithms live in [`proposal_writer_core`]; this
//! crate adds configuration, logging, the SQLite backend and embedding
//! clients, wired together by [`Engine`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` backend |
//! | [`embedding`] | OpenAI / Ollama embedding clients |
//! | [`engine`] | Ingest, search and draft entry points |

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod logging;
pub mod migrate;
pub mod sqlite_store;

pub use engine::Engine;
pub use proposal_writer_core as core;
