// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! VPN assignments: the persisted record of which account owns which tunnel
//! address and key pair.
//!
//! Rows are returned as stored. Decoding the address and keys is left to the
//! caller so one bad row does not hide the others.

use chrono::{DateTime, Utc};
use fwvpn_common_secret::SecretString;
use sqlx::sqlite::SqlitePool;

use crate::accounts::from_unix;
use crate::error::DbError;

pub type VpnAssignmentRowTuple = (String, String, String, String, i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnAssignment {
	pub user_id: String,
	pub assigned_ip: String,
	pub private_key: SecretString,
	pub public_key: String,
	pub created_at: DateTime<Utc>,
}

impl VpnAssignment {
	fn from_row((user_id, assigned_ip, private_key, public_key, created_at): VpnAssignmentRowTuple) -> Self {
		Self {
			user_id,
			assigned_ip,
			private_key: SecretString::new(private_key),
			public_key,
			created_at: from_unix(created_at),
		}
	}
}

#[derive(Clone)]
pub struct VpnConfigRepository {
	pool: SqlitePool,
}

impl VpnConfigRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_assignments(&self) -> Result<Vec<VpnAssignment>, DbError> {
		let rows: Vec<VpnAssignmentRowTuple> = sqlx::query_as(
			"SELECT user_id, assigned_ip, private_key, public_key, created_at
			 FROM vpn_configs ORDER BY created_at, user_id",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(VpnAssignment::from_row).collect())
	}

	#[tracing::instrument(skip(self), fields(%user_id))]
	pub async fn get_assignment(&self, user_id: &str) -> Result<Option<VpnAssignment>, DbError> {
		let row: Option<VpnAssignmentRowTuple> = sqlx::query_as(
			"SELECT user_id, assigned_ip, private_key, public_key, created_at
			 FROM vpn_configs WHERE user_id = ?",
		)
		.bind(user_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(VpnAssignment::from_row))
	}

	/// Stores a new assignment.
	///
	/// Fails with `Conflict` if the account, address or either key is already
	/// taken, and `NotFound` if the account does not exist.
	#[tracing::instrument(skip(self, private_key), fields(%user_id, %assigned_ip, %public_key))]
	pub async fn insert_assignment(
		&self,
		user_id: &str,
		assigned_ip: &str,
		private_key: &SecretString,
		public_key: &str,
	) -> Result<VpnAssignment, DbError> {
		let created_at = Utc::now().timestamp();
		sqlx::query(
			"INSERT INTO vpn_configs (user_id, assigned_ip, private_key, public_key, created_at)
			 VALUES (?, ?, ?, ?, ?)",
		)
		.bind(user_id)
		.bind(assigned_ip)
		.bind(private_key.expose().as_str())
		.bind(public_key)
		.bind(created_at)
		.execute(&self.pool)
		.await?;

		Ok(VpnAssignment {
			user_id: user_id.to_string(),
			assigned_ip: assigned_ip.to_string(),
			private_key: private_key.clone(),
			public_key: public_key.to_string(),
			created_at: from_unix(created_at),
		})
	}

	#[tracing::instrument(skip(self), fields(%user_id))]
	pub async fn delete_assignment(&self, user_id: &str) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM vpn_configs WHERE user_id = ?")
			.bind(user_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	/// Addresses currently handed out, as stored.
	#[tracing::instrument(skip(self))]
	pub async fn assigned_ips(&self) -> Result<Vec<String>, DbError> {
		let rows: Vec<(String,)> = sqlx::query_as("SELECT assigned_ip FROM vpn_configs")
			.fetch_all(&self.pool)
			.await?;

		Ok(rows.into_iter().map(|(ip,)| ip).collect())
	}
}
