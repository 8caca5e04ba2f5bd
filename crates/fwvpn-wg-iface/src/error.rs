// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use fwvpn_wg_keys::WgPublicKey;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WgError {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("{op} {ifname}: {source}")]
	Os {
		op: &'static str,
		ifname: String,
		#[source]
		source: io::Error,
	},

	#[error("control channel for {0} is closed")]
	Closed(String),

	#[error("peer limit of {max} reached")]
	Capacity { max: usize },

	#[error("peer {0} not found")]
	PeerNotFound(WgPublicKey),

	#[error("malformed control message: {0}")]
	Malformed(String),

	#[error("{ifname}: configuration size still changing after {rounds} reads")]
	SizeNegotiation { ifname: String, rounds: usize },

	#[error("interface lock poisoned")]
	LockPoisoned,
}

impl WgError {
	pub(crate) fn os(op: &'static str, ifname: impl Into<String>, source: io::Error) -> Self {
		Self::Os {
			op,
			ifname: ifname.into(),
			source,
		}
	}

	/// True when the OS refused a create because the interface already exists.
	pub fn is_already_exists(&self) -> bool {
		matches!(self, Self::Os { source, .. } if source.kind() == io::ErrorKind::AlreadyExists)
	}

	/// True when the OS reports that the interface does not exist.
	pub fn is_no_such_interface(&self) -> bool {
		matches!(self, Self::Os { source, .. } if source.kind() == io::ErrorKind::NotFound)
	}
}

pub type Result<T> = std::result::Result<T, WgError>;
