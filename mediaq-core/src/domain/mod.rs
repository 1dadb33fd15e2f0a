//! Core domain types
//!
//! This module contains the domain structures shared by the store, the
//! lifecycle manager and the HTTP layer.

pub mod job;
