//! # Memory Harness
//!
//! File-backed project and user memory for AI coding assistants: markdown
//! knowledge files under a global root (`~/.claude/memory`) and a project
//! root (`.claude/memory`), searched with a hybrid of full-text and vector
//! retrieval and injected at session start under a token budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────────┐
//! │   Scanner   │──▶│   Indexer    │──▶│ SQLite FTS5       │
//! │ global+proj │   │ chunk+embed  │   │ pgvector / SQLite │
//! └─────────────┘   └──────────────┘   └─────────┬─────────┘
//!                                                │
//!        ┌──────────────┐               ┌────────┴────────┐
//!        │ Context load │               │ Hybrid searcher │
//!        │ (budgeted)   │               │ (merge + fallback)
//!        └──────────────┘               └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and validation |
//! | [`scanner`] | Knowledge-file discovery |
//! | [`keyword`] | SQLite FTS5 keyword index |
//! | [`vector`] | pgvector and SQLite vector indexes |
//! | [`embedding`] | OpenAI and Ollama embedders |
//! | [`backends`] | Backend wiring and degraded modes |
//! | [`indexer`] | Incremental index maintenance |
//! | [`search`] | Hybrid search |
//! | [`context`] | Budgeted session-start context |
//! | [`status`] | Index status overview |
//! | [`remember`] | Memory capture with secret scanning |
//! | [`init`] | Directory and schema setup |
//! | [`db`] | SQLite connections |
//! | [`logging`] | Subscriber setup |
//!
//! Pure logic (chunking, ranking, budgeting, backend traits) lives in
//! `memory-harness-core`.

pub mod backends;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod indexer;
pub mod init;
pub mod keyword;
pub mod logging;
pub mod remember;
pub mod scanner;
pub mod search;
pub mod status;
pub mod vector;
