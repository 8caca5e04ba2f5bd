// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id TEXT PRIMARY KEY,
		email TEXT UNIQUE NOT NULL,
		password TEXT NOT NULL,
		created_at INTEGER NOT NULL,
		last_login INTEGER
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS vpn_configs (
		user_id TEXT PRIMARY KEY REFERENCES users(id),
		assigned_ip TEXT UNIQUE NOT NULL,
		private_key TEXT UNIQUE NOT NULL,
		public_key TEXT UNIQUE NOT NULL,
		created_at INTEGER NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS sessions (
		token TEXT PRIMARY KEY,
		user_id TEXT NOT NULL REFERENCES users(id),
		expires_at INTEGER NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
];

/// Creates the fwvpnd tables if they do not exist yet.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = STATEMENTS.len(), "schema applied");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pool::{create_pool, MEMORY_DB};

	#[tokio::test]
	async fn migrations_are_repeatable() {
		let pool = create_pool(MEMORY_DB).await.unwrap();
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let tables: Vec<(String,)> = sqlx::query_as(
			"SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
		)
		.fetch_all(&pool)
		.await
		.unwrap();
		let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
		assert_eq!(names, vec!["sessions", "users", "vpn_configs"]);
	}

	#[tokio::test]
	async fn foreign_keys_are_enforced() {
		let pool = create_pool(MEMORY_DB).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let err = sqlx::query(
			"INSERT INTO vpn_configs (user_id, assigned_ip, private_key, public_key, created_at)
			 VALUES ('ghost', '10.0.0.2', 'a', 'b', 0)",
		)
		.execute(&pool)
		.await
		.unwrap_err();
		assert!(matches!(DbError::from(err), DbError::NotFound(_)));
	}
}
