// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite storage for fwvpnd.

pub mod accounts;
pub mod error;
pub mod pool;
pub mod schema;
pub mod testing;
pub mod vpn;

pub use accounts::{Account, AccountRepository};
pub use error::{DbError, Result};
pub use pool::{create_pool, MEMORY_DB};
pub use schema::run_migrations;
pub use sqlx::sqlite::SqlitePool;
pub use vpn::{VpnAssignment, VpnConfigRepository};
