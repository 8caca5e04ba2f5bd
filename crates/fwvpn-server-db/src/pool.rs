// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;

use crate::error::DbError;

/// Path that selects a private in-memory database.
pub const MEMORY_DB: &str = ":memory:";

/// Create a SqlitePool for `db_path`.
///
/// `db_path` is a filesystem path, a `sqlite:` URL, or `:memory:`. File
/// databases are created if missing and use WAL. An in-memory database lives
/// in a single connection, since every new connection would see an empty
/// database.
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid, `DbError::Sqlx` if the
/// connection fails.
#[tracing::instrument]
pub async fn create_pool(db_path: &str) -> Result<SqlitePool, DbError> {
	if db_path.is_empty() {
		return Err(DbError::Internal("database path is empty".to_string()));
	}

	let (options, max_connections) = if db_path == MEMORY_DB {
		(SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
	} else if db_path.starts_with("sqlite:") {
		let options = SqliteConnectOptions::from_str(db_path)
			.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
			.journal_mode(SqliteJournalMode::Wal)
			.create_if_missing(true);
		(options, 5)
	} else {
		let options = SqliteConnectOptions::new()
			.filename(db_path)
			.journal_mode(SqliteJournalMode::Wal)
			.create_if_missing(true);
		(options, 5)
	};

	let options = options
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true);

	let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
	if max_connections == 1 {
		// Dropping the only connection would drop the database with it.
		pool_options = pool_options
			.min_connections(1)
			.idle_timeout(None)
			.max_lifetime(None);
	}
	let pool = pool_options.connect_with(options).await?;

	tracing::debug!(max_connections, "database pool created");
	Ok(pool)
}
