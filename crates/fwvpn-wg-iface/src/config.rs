// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structural get/set of interface configuration.
//!
//! Every message is a partial view: a `None` field is neither reported nor
//! changed. Peers in a `set` are added, updated or (when flagged) removed;
//! the rest of the kernel peer set is left alone unless `replace_peers` is
//! true.

use crate::error::{Result, WgError};
use crate::handle::WgHandle;
use crate::peers::Peer;
use crate::wire;
use fwvpn_wg_keys::{WgPrivateKey, WgPublicKey};
use std::sync::atomic::Ordering;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// Upper bound on get rounds while the reported size keeps growing.
const MAX_SIZE_ROUNDS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceConfig {
	pub listen_port: Option<u16>,
	pub private_key: Option<WgPrivateKey>,
	/// Reported by the kernel; ignored on set.
	pub public_key: Option<WgPublicKey>,
	pub rtable: Option<i32>,
	pub replace_peers: bool,
	pub peers: Vec<Peer>,
}

impl InterfaceConfig {
	pub fn with_listen_port(mut self, port: u16) -> Self {
		self.listen_port = Some(port);
		self
	}

	pub fn with_private_key(mut self, key: WgPrivateKey) -> Self {
		self.private_key = Some(key);
		self
	}

	pub fn with_peer(mut self, peer: Peer) -> Self {
		self.peers.push(peer);
		self
	}

	pub fn peer(&self, key: &WgPublicKey) -> Option<&Peer> {
		self.peers.iter().find(|p| p.public_key == *key)
	}
}

impl WgHandle {
	/// Reads the full interface configuration.
	pub fn get(&self) -> Result<InterfaceConfig> {
		self.get_seeded(&InterfaceConfig::default())
	}

	/// Reads the configuration with `seed` as the request body.
	///
	/// The buffer starts at the size of the previous response (or the seed,
	/// whichever is larger). When the driver reports a larger size the read is
	/// repeated with a buffer of that size, so a response is never decoded
	/// from a truncated buffer.
	#[instrument(skip(self, seed), fields(ifname = %self.name(), seed_peers = seed.peers.len()))]
	pub(crate) fn get_seeded(&self, seed: &InterfaceConfig) -> Result<InterfaceConfig> {
		let channel = self.channel()?;
		let request = wire::encode(seed)?;
		let mut size = self.size_hint.load(Ordering::Relaxed).max(request.len());

		for round in 0..MAX_SIZE_ROUNDS {
			let mut buf = Zeroizing::new(vec![0u8; size]);
			buf[..request.len()].copy_from_slice(&request);

			let required = channel
				.get(self.name(), &mut buf)
				.map_err(|e| WgError::os("get", self.name().as_str(), e))?;

			if required <= size {
				self.size_hint.store(required, Ordering::Relaxed);
				return wire::decode(&buf[..required]);
			}

			debug!(round, size, required, "configuration grew, retrying read");
			size = required;
		}

		Err(WgError::SizeNegotiation {
			ifname: self.name().to_string(),
			rounds: MAX_SIZE_ROUNDS,
		})
	}

	/// Applies the flagged fields of `config`.
	#[instrument(skip(self, config), fields(ifname = %self.name(), port = ?config.listen_port, peers = config.peers.len()))]
	pub fn set(&mut self, config: &InterfaceConfig) -> Result<()> {
		let mut buf = Zeroizing::new(wire::encode(config)?);
		self.channel()?
			.set(self.name(), &mut buf)
			.map_err(|e| WgError::os("set", self.name().as_str(), e))
	}

	pub fn listen_port(&self) -> Result<Option<u16>> {
		Ok(self.get()?.listen_port)
	}

	pub fn set_listen_port(&mut self, port: u16) -> Result<()> {
		self.set(&InterfaceConfig::default().with_listen_port(port))
	}

	pub fn public_key(&self) -> Result<Option<WgPublicKey>> {
		Ok(self.get()?.public_key)
	}

	pub fn set_private_key(&mut self, key: &WgPrivateKey) -> Result<()> {
		self.set(&InterfaceConfig::default().with_private_key(key.clone()))
	}
}
