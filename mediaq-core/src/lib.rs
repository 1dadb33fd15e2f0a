//! Mediaq Core
//!
//! Core types and abstractions for the mediaq download queue.
//!
//! This crate contains:
//! - Domain types: the download job record and its enums
//! - DTOs: request payloads accepted by the server
//! - Validation: pure checks run before a job is created

pub mod domain;
pub mod dto;
pub mod validate;
