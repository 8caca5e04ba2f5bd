// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Duration, Utc};
use fwvpn_wg_iface::Peer;
use ipnet::IpNet;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;

/// A peer counts as connected while its last handshake is younger than this.
pub const CONNECTED_WINDOW_SECS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
	Stopped,
	Running,
	Error,
}

impl fmt::Display for DaemonState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Stopped => f.write_str("stopped"),
			Self::Running => f.write_str("running"),
			Self::Error => f.write_str("error"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
	Connected,
	Disconnected,
}

impl PeerState {
	pub fn at(last_handshake: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
		match last_handshake {
			Some(at) if now.signed_duration_since(at) < Duration::seconds(CONNECTED_WINDOW_SECS) => {
				Self::Connected
			}
			_ => Self::Disconnected,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
	pub public_key: String,
	pub allowed_ips: Vec<IpNet>,
	pub endpoint: Option<SocketAddr>,
	pub last_handshake: Option<DateTime<Utc>>,
	pub rx_bytes: u64,
	pub tx_bytes: u64,
	pub state: PeerState,
}

impl PeerStatus {
	pub fn from_peer(peer: &Peer, now: DateTime<Utc>) -> Self {
		Self {
			public_key: peer.public_key.to_base64(),
			allowed_ips: peer.allowed_ips.clone(),
			endpoint: peer.endpoint,
			last_handshake: peer.last_handshake,
			rx_bytes: peer.rx_bytes,
			tx_bytes: peer.tx_bytes,
			state: PeerState::at(peer.last_handshake, now),
		}
	}

	pub fn is_connected(&self) -> bool {
		self.state == PeerState::Connected
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStats {
	pub peer_count: usize,
	pub connected_peers: usize,
	pub rx_bytes: u64,
	pub tx_bytes: u64,
}

impl DaemonStats {
	pub fn collect(peers: &[PeerStatus]) -> Self {
		peers.iter().fold(Self::default(), |mut stats, peer| {
			stats.peer_count += 1;
			if peer.is_connected() {
				stats.connected_peers += 1;
			}
			stats.rx_bytes = stats.rx_bytes.saturating_add(peer.rx_bytes);
			stats.tx_bytes = stats.tx_bytes.saturating_add(peer.tx_bytes);
			stats
		})
	}
}
