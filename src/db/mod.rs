//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer: fill archive, generation-tagged positions, daily summaries

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{DuplicateKey, Generation, Repository};
