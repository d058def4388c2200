//! arcindex - crawl-and-index core for a peer-to-peer social web browser.
//!
//! Watches a set of append-only content-addressed archives (one per
//! participant), incrementally ingests structured JSON records into a
//! relational index with full-text search, and answers typed queries and
//! social-graph-scoped searches over that index. See `SPEC_FULL.md` for the
//! full component breakdown (C1-C6).

pub mod archive;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ingest;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod store;

pub use error::{IndexError, Result};
