//! # lexguard
//!
//! Governance-grade retrieval over the Companies Act, 2013 and its
//! subordinate material: rules, notifications, circulars, forms, SOPs and
//! commentary. Every answer is grounded in chunks whose authority level and
//! lifecycle state are known, and a question that only lower-authority
//! material can answer is refused rather than guessed at.
//!
//! The retrieval pipeline itself lives in the `lexguard-core` crate. This
//! crate supplies SQLite storage, HTTP embedding and language model
//! clients, the ingestion-side commands, and the CLI and HTTP surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ import JSONL │──▶│ parent+child │──▶│    SQLite    │
//! │  lifecycle   │   │   backfill   │   │ rules+vectors│
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                    ┌──────────┐        ┌──────────┐
//!                    │   CLI    │        │   HTTP   │
//!                    │(lexguard)│        │  /api/*  │
//!                    └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexguard init                           # create database
//! lexguard import chunks.jsonl            # load parent chunks
//! lexguard lifecycle approve ca2013_act_s017
//! lexguard embed pending                  # embed child chunks
//! lexguard query "What does section 17 require?"
//! lexguard serve                          # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Chunk repository, writer and vector index on SQLite |
//! | [`embedding`] | Embedding provider clients |
//! | [`llm`] | Language model clients |
//! | [`import`] | JSONL chunk import |
//! | [`embed_cmd`] | Embedding backfill |
//! | [`lifecycle`] | Approve / retire |
//! | [`get`] | Chunk detail and anchor lookup |
//! | [`query`] | Question answering from the CLI |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod import;
pub mod lifecycle;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sqlite_store;
