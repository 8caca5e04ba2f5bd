// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database configuration.

use serde::Deserialize;

const DEFAULT_DB_PATH: &str = "/var/fwvpn/db/vpn.db";

/// Database configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
	/// Filesystem path, `sqlite:` URL, or `:memory:`.
	pub path: String,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			path: DEFAULT_DB_PATH.to_string(),
		}
	}
}

/// Database configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub path: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.path.is_some() {
			self.path = other.path;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			path: self.path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
		}
	}
}
