//! Storage consistency and hybrid search for a legal knowledge base.
//!
//! * [`path`]: canonical hierarchical paths.
//! * [`storage`]: the metadata and blob store contracts and the [`storage::Coordinator`] that
//!   keeps them consistent.
//! * [`embedding`]: embedder and vector index contracts.
//! * [`search`]: indexing and ranked search.

pub mod config;
pub mod context;
pub mod embedding;
pub mod path;
pub mod search;
pub mod storage;
