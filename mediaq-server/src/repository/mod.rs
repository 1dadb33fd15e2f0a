//! Repository Module
//!
//! Data access layer for the server.
//! Every function is a single statement against the jobs table.

pub mod job;

// Re-export for convenience
pub use job as job_repository;
