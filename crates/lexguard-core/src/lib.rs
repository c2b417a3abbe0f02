//! # lexguard core
//!
//! Governance-grade retrieval over a statute corpus: the chunk model with
//! its parent/child lineage, the authority and refusal rule engine, query
//! classification, direct structural lookup, best-effort semantic search,
//! and cited answer synthesis.
//!
//! This crate contains no SQL, HTTP clients, or filesystem I/O. Storage,
//! embeddings and the language model are reached through the traits in
//! [`store`], [`embedding`] and [`llm`]; the `lexguard` application crate
//! provides SQLite and HTTP implementations, and [`store::memory`] provides
//! an in-memory one.
//!
//! The entry point for answering questions is [`retrieval::Retriever`].

pub mod chunk;
pub mod classifier;
pub mod direct;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod llm;
pub mod models;
pub mod refusal;
pub mod retrieval;
pub mod rules;
pub mod semantic;
pub mod store;
pub mod synth;
