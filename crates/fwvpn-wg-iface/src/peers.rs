// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer directory: add, remove and query single peers by public key.
//!
//! Each mutation is one structural set carrying exactly one peer entry.
//! Removing a key the interface does not hold succeeds.

use crate::config::InterfaceConfig;
use crate::error::{Result, WgError};
use crate::handle::WgHandle;
use crate::wire::WG_PEERS_MAX;
use chrono::{DateTime, Utc};
use fwvpn_wg_keys::WgPublicKey;
use ipnet::IpNet;
use std::net::SocketAddr;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerFlags {
	pub remove: bool,
	pub replace_allowed_ips: bool,
	/// Only update an existing peer; never create one.
	pub update_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
	pub public_key: WgPublicKey,
	pub allowed_ips: Vec<IpNet>,
	pub endpoint: Option<SocketAddr>,
	pub persistent_keepalive: Option<u16>,
	pub flags: PeerFlags,
	pub protocol_version: i32,
	pub last_handshake: Option<DateTime<Utc>>,
	pub rx_bytes: u64,
	pub tx_bytes: u64,
}

impl Peer {
	pub fn new(public_key: WgPublicKey) -> Self {
		Self {
			public_key,
			allowed_ips: Vec::new(),
			endpoint: None,
			persistent_keepalive: None,
			flags: PeerFlags::default(),
			protocol_version: 0,
			last_handshake: None,
			rx_bytes: 0,
			tx_bytes: 0,
		}
	}

	/// An entry that asks the interface to drop `public_key`.
	pub fn removal(public_key: WgPublicKey) -> Self {
		let mut peer = Self::new(public_key);
		peer.flags.remove = true;
		peer
	}

	pub fn with_allowed_ip(mut self, net: IpNet) -> Self {
		self.allowed_ips.push(net);
		self
	}

	pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
		self.endpoint = Some(endpoint);
		self
	}

	pub fn with_keepalive(mut self, seconds: u16) -> Self {
		self.persistent_keepalive = Some(seconds);
		self
	}

	pub fn replacing_allowed_ips(mut self) -> Self {
		self.flags.replace_allowed_ips = true;
		self
	}
}

/// Outcome of applying a batch of peer entries one set at a time.
#[derive(Debug, Default)]
pub struct ApplyReport {
	pub applied: Vec<WgPublicKey>,
	pub failed: Vec<(WgPublicKey, WgError)>,
}

impl ApplyReport {
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty()
	}
}

impl WgHandle {
	/// Adds or updates one peer.
	///
	/// Fails with [`WgError::Capacity`] when the interface already holds the
	/// maximum number of peers and `peer` is not one of them.
	#[instrument(skip(self, peer), fields(ifname = %self.name(), peer = %peer.public_key))]
	pub fn add_peer(&mut self, peer: &Peer) -> Result<()> {
		let current = self.get()?;
		if current.peers.len() >= WG_PEERS_MAX && current.peer(&peer.public_key).is_none() {
			warn!(count = current.peers.len(), "peer limit reached");
			return Err(WgError::Capacity { max: WG_PEERS_MAX });
		}

		self.set(&InterfaceConfig::default().with_peer(peer.clone()))?;
		info!(allowed_ips = ?peer.allowed_ips, "peer added");
		Ok(())
	}

	/// Removes the peer with `public_key`. Unknown keys are not an error.
	#[instrument(skip(self), fields(ifname = %self.name(), peer = %public_key))]
	pub fn remove_peer(&mut self, public_key: &WgPublicKey) -> Result<()> {
		self.set(&InterfaceConfig::default().with_peer(Peer::removal(*public_key)))?;
		info!("peer removed");
		Ok(())
	}

	/// Looks up one peer with a request seeded with its key.
	#[instrument(skip(self), fields(ifname = %self.name(), peer = %public_key))]
	pub fn get_peer(&self, public_key: &WgPublicKey) -> Result<Peer> {
		let seed = InterfaceConfig::default().with_peer(Peer::new(*public_key));
		self.get_seeded(&seed)?
			.peers
			.into_iter()
			.find(|p| p.public_key == *public_key)
			.ok_or(WgError::PeerNotFound(*public_key))
	}

	/// All peers, in driver order.
	pub fn list_peers(&self) -> Result<Vec<Peer>> {
		Ok(self.get()?.peers)
	}

	pub fn peer_count(&self) -> Result<usize> {
		Ok(self.get()?.peers.len())
	}

	/// Sends each entry as its own set, continuing past rejected entries.
	///
	/// Entries applied before a failure stay applied; the report names the
	/// ones that failed so the caller can retry them.
	#[instrument(skip(self, peers), fields(ifname = %self.name(), count = peers.len()))]
	pub fn apply_peers(&mut self, peers: &[Peer]) -> ApplyReport {
		let mut report = ApplyReport::default();
		for peer in peers {
			let result = if peer.flags.remove {
				self.remove_peer(&peer.public_key)
			} else {
				self.add_peer(peer)
			};
			match result {
				Ok(()) => report.applied.push(peer.public_key),
				Err(e) => {
					warn!(peer = %peer.public_key, error = %e, "peer entry rejected");
					report.failed.push((peer.public_key, e));
				}
			}
		}
		report
	}
}
