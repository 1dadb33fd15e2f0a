//! Service Module
//!
//! Business logic layer between the HTTP handlers and the store.
//! Services validate requests and hand runs to the dispatcher.

pub mod job;

// Re-export for convenience
pub use job as job_service;
