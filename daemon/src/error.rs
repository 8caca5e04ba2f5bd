// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use fwvpn_server_db::DbError;
use fwvpn_wg_iface::WgError;
use fwvpn_wg_keys::{KeyError, KeyFileError};
use thiserror::Error;

/// Failure kinds the daemon reports. Storage and interface failures are kept
/// apart so an operator can tell a broken database from a rejected interface
/// configuration.
#[derive(Debug, Error)]
pub enum FwError {
	#[error("{0}")]
	Generic(String),

	#[error("authentication failed: {0}")]
	Auth(String),

	#[error("storage error: {0}")]
	Storage(#[from] DbError),

	#[error("interface error: {0}")]
	Interface(#[from] WgError),
}

impl FwError {
	pub(crate) fn generic(message: impl Into<String>) -> Self {
		Self::Generic(message.into())
	}

	/// Process exit status for this failure.
	pub fn exit_code(&self) -> u8 {
		match self {
			Self::Generic(_) => 1,
			Self::Auth(_) => 2,
			Self::Storage(_) => 3,
			Self::Interface(_) => 4,
		}
	}
}

impl From<KeyError> for FwError {
	fn from(err: KeyError) -> Self {
		Self::Generic(format!("invalid key: {err}"))
	}
}

impl From<KeyFileError> for FwError {
	fn from(err: KeyFileError) -> Self {
		Self::Generic(format!("server key file: {err}"))
	}
}

pub type Result<T> = std::result::Result<T, FwError>;
