//! # docsync
//!
//! Keeps a remote vector index in sync with a local folder of documents and
//! serves grounded question-answering over that index.
//!
//! The core is the synchronization engine: change detection via content
//! hashes, sentence-boundary chunking, and vector lifecycle management with
//! a hard consistency goal: after any successful sync cycle the tracked
//! state matches the folder exactly and every tracked file's vector ids
//! match the store's contents for that file. No duplicates, no stale
//! vectors, no orphans.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Folder  │──▶│  Hash Tracker  │──▶│  Lifecycle    │──▶│ Vector Store │
//! │   scan   │   │  (diff state)  │   │ chunk+embed  │   │  (remote)    │
//! └──────────┘   └───────────────┘   └──────────────┘   └──────┬──────┘
//!                                                              │
//!                                           ┌──────────────────┤
//!                                           ▼                  ▼
//!                                      ┌─────────┐       ┌──────────┐
//!                                      │   CLI    │       │   HTTP   │
//!                                      │(docsync)│       │  server  │
//!                                      └─────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsync sync                   # reconcile the folder against the index
//! docsync ask "deployment steps" # grounded Q&A with source attribution
//! docsync cleanup                # remove vectors for deleted files
//! docsync serve                  # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Crate-wide error taxonomy |
//! | [`tracker`] | Persistent file-hash tracking |
//! | [`chunk`] | Sentence-boundary text chunking |
//! | [`extract`] | Multi-format text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction |
//! | [`retry`] | Shared retry/backoff policy |
//! | [`reconcile`] | Per-file vector lifecycle |
//! | [`sync`] | Sync cycle orchestration |
//! | [`answer`] | Query/answer composition |
//! | [`server`] | Operational HTTP server |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod models;
pub mod reconcile;
pub mod retry;
pub mod server;
pub mod store;
pub mod sync;
pub mod tracker;
