//! # convo-index
//!
//! A local search index over an archive of exported AI conversations.
//!
//! Each archive file is one conversation. Building the index parses every
//! file, classifies message content, extracts shell commands, and writes
//! everything to SQLite with FTS5 mirrors. A fuzzy snapshot of the same data
//! backs typo-tolerant fallback search. The index is exposed to agents as a
//! set of tools over MCP (stdio) or a JSON HTTP API, and to people through
//! the `convo` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Archive  │──▶│ Ingest       │──▶│ SQLite       │
//! │ *.json   │   │ classify +   │   │ tables + FTS5│
//! └──────────┘   │ extract      │   └──────┬───────┘
//!                └──────────────┘          │ snapshot
//!                                          ▼
//!                ┌──────────────┐   ┌──────────────┐
//!                │ Tools        │◀──│ SearchIndex  │
//!                │ MCP / HTTP   │   │ FTS → fuzzy  │
//!                └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`archive`] | Archive file format and parsing |
//! | [`classify`] | Message content classification |
//! | [`extract`] | Shell command extraction |
//! | [`store`] | SQLite store with FTS5 mirrors |
//! | [`ingest`] | Batched archive ingestion |
//! | [`fuzzy`] | In-memory fuzzy snapshot |
//! | [`index`] | Query engine and index lifecycle |
//! | [`tools`] | Tool registry shared by both transports |
//! | [`mcp`] | MCP stdio bridge |
//! | [`server`] | HTTP tool API |
//! | [`workspace`] | Project workspace search |
//! | [`config`] | TOML configuration |
//! | [`error`] | Engine error type |

pub mod archive;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fuzzy;
pub mod index;
pub mod ingest;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod search;
pub mod server;
pub mod snippet;
pub mod stats;
pub mod store;
pub mod tools;
pub mod workspace;
