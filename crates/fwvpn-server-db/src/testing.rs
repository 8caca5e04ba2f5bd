// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use fwvpn_common_secret::SecretString;
use sqlx::sqlite::SqlitePool;

use crate::accounts::AccountRepository;
use crate::pool::{create_pool, MEMORY_DB};
use crate::schema::run_migrations;

pub async fn create_test_pool() -> SqlitePool {
	let pool = create_pool(MEMORY_DB).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

pub async fn insert_test_account(pool: &SqlitePool, id: &str) {
	AccountRepository::new(pool.clone())
		.insert_account(
			id,
			&format!("{id}@example.com"),
			&SecretString::new("not-a-real-hash".to_string()),
		)
		.await
		.unwrap();
}
