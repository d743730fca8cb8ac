//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `fills.rs` - Fill archive
//! - `positions.rs` - Generation-tagged position store
//! - `daily.rs` - Daily summary upserts

mod daily;
mod fills;
mod positions;

use crate::domain::Decimal;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use tracing::warn;

pub use positions::{DuplicateKey, Generation};

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a stored decimal column, falling back to zero on corruption.
pub(crate) fn decimal_column(raw: &str, column: &str, context: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!(
            context = %context,
            column = %column,
            value = %raw,
            error = %e,
            "Failed to parse stored decimal, using default"
        );
        Decimal::default()
    })
}
