//! Data Transfer Objects
//!
//! Request bodies accepted by the HTTP API. Field values are kept loose here
//! and checked by [`crate::validate`] before anything is persisted.

pub mod job;
