//! # Memory Harness Core
//!
//! Shared, I/O-free logic for Memory Harness: data models, chunking and
//! fingerprints, token estimation, the budgeted context assembler, the
//! hybrid merge, backend traits, and the embedding trait.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! File contents reach the assembler through a caller-supplied reader.

pub mod budget;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod rank;
pub mod store;
pub mod tokens;
