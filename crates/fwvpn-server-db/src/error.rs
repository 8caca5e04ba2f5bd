// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[source] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),
}

impl From<sqlx::Error> for DbError {
	fn from(err: sqlx::Error) -> Self {
		match &err {
			sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(db.message().to_string()),
			sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
				Self::NotFound(db.message().to_string())
			}
			_ => Self::Sqlx(err),
		}
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
