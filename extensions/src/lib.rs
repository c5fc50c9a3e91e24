//! Concrete backends for Casebase: a filesystem blob store, JSON-persisted metadata and
//! vector index stores, and a local feature-hashing embedder.

pub mod blob;
pub mod embedding;
pub mod persist;
