// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account rows. Only what provisioning needs: accounts are created and
//! authenticated by the HTTP API, which owns the password column.

use chrono::{DateTime, Utc};
use fwvpn_common_secret::SecretString;
use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

pub type AccountRowTuple = (String, String, i64, Option<i64>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
	pub id: String,
	pub email: String,
	pub created_at: DateTime<Utc>,
	pub last_login: Option<DateTime<Utc>>,
}

impl Account {
	fn from_row((id, email, created_at, last_login): AccountRowTuple) -> Self {
		Self {
			id,
			email,
			created_at: from_unix(created_at),
			last_login: last_login.map(from_unix),
		}
	}
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
	DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[derive(Clone)]
pub struct AccountRepository {
	pool: SqlitePool,
}

impl AccountRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, password_hash), fields(%id))]
	pub async fn insert_account(
		&self,
		id: &str,
		email: &str,
		password_hash: &SecretString,
	) -> Result<(), DbError> {
		sqlx::query(
			"INSERT INTO users (id, email, password, created_at)
			 VALUES (?, ?, ?, ?)",
		)
		.bind(id)
		.bind(email)
		.bind(password_hash.expose().as_str())
		.bind(Utc::now().timestamp())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(%id))]
	pub async fn get_account(&self, id: &str) -> Result<Option<Account>, DbError> {
		let row: Option<AccountRowTuple> = sqlx::query_as(
			"SELECT id, email, created_at, last_login FROM users WHERE id = ?",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(Account::from_row))
	}

	#[tracing::instrument(skip(self), fields(%id))]
	pub async fn record_login(&self, id: &str) -> Result<u64, DbError> {
		let result = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
			.bind(Utc::now().timestamp())
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn insert_and_get_account() {
		let repo = AccountRepository::new(create_test_pool().await);
		repo.insert_account("u1", "a@example.com", &SecretString::new("hash".to_string()))
			.await
			.unwrap();

		let account = repo.get_account("u1").await.unwrap().unwrap();
		assert_eq!(account.email, "a@example.com");
		assert!(account.last_login.is_none());
	}

	#[tokio::test]
	async fn duplicate_email_is_conflict() {
		let repo = AccountRepository::new(create_test_pool().await);
		let hash = SecretString::new("hash".to_string());
		repo.insert_account("u1", "a@example.com", &hash).await.unwrap();
		let err = repo.insert_account("u2", "a@example.com", &hash).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn record_login_sets_timestamp() {
		let repo = AccountRepository::new(create_test_pool().await);
		repo.insert_account("u1", "a@example.com", &SecretString::new("hash".to_string()))
			.await
			.unwrap();
		assert_eq!(repo.record_login("u1").await.unwrap(), 1);
		assert!(repo.get_account("u1").await.unwrap().unwrap().last_login.is_some());
		assert_eq!(repo.record_login("nobody").await.unwrap(), 0);
	}
}
