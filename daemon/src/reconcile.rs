// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Brings the live peer set of the interface into line with the stored VPN
//! assignments.
//!
//! Planning is pure: [`plan`] compares the desired peers with what the
//! interface reports and returns the mutations. [`apply`] sends each mutation
//! as its own set and keeps going past rejected ones.

use fwvpn_server_db::VpnAssignment;
use fwvpn_wg_iface::{Peer, WgHandle};
use fwvpn_wg_keys::WgPublicKey;
use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use tracing::{debug, info, instrument, warn};

/// A tunnel address as a single-host allowed ip.
pub fn host_net(ip: Ipv4Addr) -> Result<IpNet, String> {
	Ipv4Net::new(ip, 32)
		.map(IpNet::V4)
		.map_err(|e| format!("{ip}: {e}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileFailure {
	/// Public key as base64, or the stored text when it did not decode.
	pub peer: String,
	pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
	pub added: Vec<WgPublicKey>,
	pub updated: Vec<WgPublicKey>,
	pub removed: Vec<WgPublicKey>,
	pub failed: Vec<ReconcileFailure>,
}

impl ReconcileReport {
	pub fn is_clean(&self) -> bool {
		self.failed.is_empty()
	}

	pub fn changes(&self) -> usize {
		self.added.len() + self.updated.len() + self.removed.len()
	}
}

/// Peers the stored assignments call for, plus the records that could not be
/// turned into a peer.
#[derive(Debug, Default)]
pub struct DesiredPeers {
	pub peers: Vec<Peer>,
	pub invalid: Vec<ReconcileFailure>,
}

pub fn desired_peers(assignments: &[VpnAssignment], keepalive: u16) -> DesiredPeers {
	let mut desired = DesiredPeers::default();
	let mut seen = HashSet::new();

	for assignment in assignments {
		match peer_for(assignment, keepalive) {
			Ok(peer) if !seen.insert(peer.public_key) => desired.invalid.push(ReconcileFailure {
				peer: assignment.public_key.clone(),
				reason: format!("key already assigned to another account (user {})", assignment.user_id),
			}),
			Ok(peer) => desired.peers.push(peer),
			Err(reason) => {
				warn!(user_id = %assignment.user_id, %reason, "skipping unusable VPN assignment");
				desired.invalid.push(ReconcileFailure {
					peer: assignment.public_key.clone(),
					reason,
				});
			}
		}
	}
	desired
}

fn peer_for(assignment: &VpnAssignment, keepalive: u16) -> Result<Peer, String> {
	let key = WgPublicKey::from_base64(&assignment.public_key).map_err(|e| format!("public key: {e}"))?;
	let ip: Ipv4Addr = assignment
		.assigned_ip
		.parse()
		.map_err(|e| format!("assigned ip '{}': {e}", assignment.assigned_ip))?;
	Ok(Peer::new(key)
		.with_allowed_ip(host_net(ip)?)
		.with_keepalive(keepalive))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerChange {
	Add(Peer),
	/// Sent with replace-allowed-ips so the stale ranges go away. Also used
	/// when only the keepalive differs.
	Update(Peer),
	Remove(WgPublicKey),
}

impl PeerChange {
	pub fn public_key(&self) -> WgPublicKey {
		match self {
			Self::Add(peer) | Self::Update(peer) => peer.public_key,
			Self::Remove(key) => *key,
		}
	}
}

fn aip_set(peer: &Peer) -> BTreeSet<IpNet> {
	peer.allowed_ips.iter().map(IpNet::trunc).collect()
}

/// The kernel reports a disabled keepalive as 0. A desired peer without a
/// keepalive leaves whatever the interface has.
fn is_stale(current: &Peer, desired: &Peer) -> bool {
	let keepalive_differs = desired
		.persistent_keepalive
		.is_some_and(|want| current.persistent_keepalive.unwrap_or(0) != want);
	keepalive_differs || aip_set(current) != aip_set(desired)
}

/// Mutations that turn `actual` into `desired`.
///
/// Adds and updates come first, in desired order; removals follow in the
/// order the interface reported them.
pub fn plan(desired: &[Peer], actual: &[Peer]) -> Vec<PeerChange> {
	let live: HashMap<WgPublicKey, &Peer> = actual.iter().map(|p| (p.public_key, p)).collect();
	let wanted: HashSet<WgPublicKey> = desired.iter().map(|p| p.public_key).collect();

	let mut changes = Vec::new();
	for peer in desired {
		match live.get(&peer.public_key) {
			None => changes.push(PeerChange::Add(peer.clone())),
			Some(current) if is_stale(current, peer) => {
				changes.push(PeerChange::Update(peer.clone().replacing_allowed_ips()))
			}
			Some(_) => {}
		}
	}
	for peer in actual {
		if !wanted.contains(&peer.public_key) {
			changes.push(PeerChange::Remove(peer.public_key));
		}
	}
	changes
}

#[instrument(skip(handle, changes), fields(ifname = %handle.name(), count = changes.len()))]
pub fn apply(handle: &mut WgHandle, changes: &[PeerChange]) -> ReconcileReport {
	let entries: Vec<Peer> = changes
		.iter()
		.map(|change| match change {
			PeerChange::Add(peer) | PeerChange::Update(peer) => peer.clone(),
			PeerChange::Remove(key) => Peer::removal(*key),
		})
		.collect();
	let kinds: HashMap<WgPublicKey, &PeerChange> = changes.iter().map(|c| (c.public_key(), c)).collect();

	let applied = handle.apply_peers(&entries);
	let mut report = ReconcileReport::default();
	for key in applied.applied {
		match kinds.get(&key) {
			Some(PeerChange::Add(_)) => report.added.push(key),
			Some(PeerChange::Update(_)) => report.updated.push(key),
			Some(PeerChange::Remove(_)) | None => report.removed.push(key),
		}
	}
	report.failed = applied
		.failed
		.into_iter()
		.map(|(key, e)| ReconcileFailure {
			peer: key.to_base64(),
			reason: e.to_string(),
		})
		.collect();

	debug!(changes = report.changes(), failed = report.failed.len(), "reconcile applied");
	report
}

/// Plans against the live peer set and applies the result. Records in
/// `desired.invalid` are carried into the report.
pub fn reconcile(handle: &mut WgHandle, desired: DesiredPeers) -> fwvpn_wg_iface::Result<ReconcileReport> {
	let actual = handle.list_peers()?;
	let changes = plan(&desired.peers, &actual);
	let mut report = apply(handle, &changes);
	report.failed.extend(desired.invalid);
	info!(
		added = report.added.len(),
		updated = report.updated.len(),
		removed = report.removed.len(),
		failed = report.failed.len(),
		"peers reconciled"
	);
	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use fwvpn_common_secret::SecretString;
	use fwvpn_wg_iface::MemoryDriver;

	fn key(n: u8) -> WgPublicKey {
		WgPublicKey::from_bytes([n; 32])
	}

	fn peer(n: u8, ip: &str) -> Peer {
		Peer::new(key(n)).with_allowed_ip(ip.parse().unwrap())
	}

	fn assignment(user: &str, ip: &str, public_key: &str) -> VpnAssignment {
		VpnAssignment {
			user_id: user.to_string(),
			assigned_ip: ip.to_string(),
			private_key: SecretString::new("unused".to_string()),
			public_key: public_key.to_string(),
			created_at: Utc::now(),
		}
	}

	#[test]
	fn plan_adds_missing_updates_stale_removes_orphans() {
		let desired = vec![peer(1, "10.0.0.2/32"), peer(2, "10.0.0.3/32"), peer(3, "10.0.0.4/32")];
		let actual = vec![peer(2, "10.0.0.3/32"), peer(3, "10.0.0.9/32"), peer(4, "10.0.0.5/32")];

		let changes = plan(&desired, &actual);
		assert_eq!(
			changes,
			vec![
				PeerChange::Add(peer(1, "10.0.0.2/32")),
				PeerChange::Update(peer(3, "10.0.0.4/32").replacing_allowed_ips()),
				PeerChange::Remove(key(4)),
			]
		);
	}

	#[test]
	fn plan_is_empty_when_in_sync() {
		let peers = vec![peer(1, "10.0.0.2/32"), peer(2, "10.0.0.3/32")];
		assert!(plan(&peers, &peers).is_empty());
	}

	#[test]
	fn plan_ignores_allowed_ip_order() {
		let desired = vec![Peer::new(key(1))
			.with_allowed_ip("10.0.0.2/32".parse().unwrap())
			.with_allowed_ip("10.1.0.0/16".parse().unwrap())];
		let actual = vec![Peer::new(key(1))
			.with_allowed_ip("10.1.0.0/16".parse().unwrap())
			.with_allowed_ip("10.0.0.2/32".parse().unwrap())];
		assert!(plan(&desired, &actual).is_empty());
	}

	#[test]
	fn plan_updates_peer_with_wrong_keepalive() {
		let desired = vec![peer(1, "10.0.0.2/32").with_keepalive(25)];
		let stale = vec![peer(1, "10.0.0.2/32").with_keepalive(10)];
		let disabled = vec![peer(1, "10.0.0.2/32")];

		let expected = vec![PeerChange::Update(desired[0].clone().replacing_allowed_ips())];
		assert_eq!(plan(&desired, &stale), expected);
		assert_eq!(plan(&desired, &disabled), expected);
		assert!(plan(&desired, &desired).is_empty());
	}

	#[test]
	fn plan_leaves_keepalive_alone_when_not_desired() {
		let desired = vec![peer(1, "10.0.0.2/32")];
		let actual = vec![peer(1, "10.0.0.2/32").with_keepalive(10)];
		assert!(plan(&desired, &actual).is_empty());
	}

	#[test]
	fn desired_peers_uses_host_routes_and_keepalive() {
		let desired = desired_peers(&[assignment("u1", "10.0.0.2", &key(1).to_base64())], 25);
		assert!(desired.invalid.is_empty());
		assert_eq!(desired.peers.len(), 1);
		assert_eq!(desired.peers[0].public_key, key(1));
		assert_eq!(desired.peers[0].allowed_ips, vec!["10.0.0.2/32".parse::<IpNet>().unwrap()]);
		assert_eq!(desired.peers[0].persistent_keepalive, Some(25));
	}

	#[test]
	fn undecodable_records_become_failures() {
		let desired = desired_peers(
			&[
				assignment("u1", "10.0.0.2", "not-a-key"),
				assignment("u2", "10.0.0.300", &key(2).to_base64()),
				assignment("u3", "10.0.0.4", &key(3).to_base64()),
			],
			25,
		);
		assert_eq!(desired.peers.len(), 1);
		assert_eq!(desired.invalid.len(), 2);
		assert_eq!(desired.invalid[0].peer, "not-a-key");
		assert!(desired.invalid[1].reason.contains("assigned ip"));
	}

	#[test]
	fn reconcile_reports_partial_failure_and_keeps_going() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		handle.add_peer(&peer(9, "10.0.0.99/32")).unwrap();
		driver.reject_peer(key(2));

		let desired = DesiredPeers {
			peers: vec![peer(1, "10.0.0.2/32"), peer(2, "10.0.0.3/32"), peer(3, "10.0.0.4/32")],
			invalid: vec![],
		};
		let report = reconcile(&mut handle, desired).unwrap();

		assert_eq!(report.added, vec![key(1), key(3)]);
		assert_eq!(report.removed, vec![key(9)]);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].peer, key(2).to_base64());
		assert_eq!(driver.peer_count("wg0"), 2);
	}

	#[test]
	fn reconcile_twice_is_a_no_op() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let desired = || DesiredPeers {
			peers: vec![peer(1, "10.0.0.2/32"), peer(2, "10.0.0.3/32")],
			invalid: vec![],
		};

		assert_eq!(reconcile(&mut handle, desired()).unwrap().added.len(), 2);
		let second = reconcile(&mut handle, desired()).unwrap();
		assert_eq!(second.changes(), 0);
		assert!(second.is_clean());
	}

	#[test]
	fn apply_sorts_outcomes_by_change_kind() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		handle.add_peer(&peer(2, "10.0.0.50/32")).unwrap();
		handle.add_peer(&peer(3, "10.0.0.4/32")).unwrap();
		driver.reject_peer(key(4));

		let changes = vec![
			PeerChange::Add(peer(1, "10.0.0.2/32")),
			PeerChange::Update(peer(2, "10.0.0.3/32").replacing_allowed_ips()),
			PeerChange::Add(peer(4, "10.0.0.5/32")),
			PeerChange::Remove(key(3)),
		];
		let report = apply(&mut handle, &changes);

		assert_eq!(report.added, vec![key(1)]);
		assert_eq!(report.updated, vec![key(2)]);
		assert_eq!(report.removed, vec![key(3)]);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].peer, key(4).to_base64());
	}

	#[test]
	fn reconcile_restores_keepalive() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		handle.add_peer(&peer(1, "10.0.0.2/32").with_keepalive(5)).unwrap();

		let desired = DesiredPeers {
			peers: vec![peer(1, "10.0.0.2/32").with_keepalive(25)],
			invalid: vec![],
		};
		let report = reconcile(&mut handle, desired).unwrap();
		assert_eq!(report.updated, vec![key(1)]);
		assert_eq!(handle.get_peer(&key(1)).unwrap().persistent_keepalive, Some(25));
	}

	#[test]
	fn stale_peer_gets_exactly_the_desired_ranges() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		handle.add_peer(&peer(1, "10.0.0.50/32")).unwrap();

		let desired = DesiredPeers {
			peers: vec![peer(1, "10.0.0.2/32")],
			invalid: vec![],
		};
		let report = reconcile(&mut handle, desired).unwrap();
		assert_eq!(report.updated, vec![key(1)]);
		assert_eq!(
			handle.get_peer(&key(1)).unwrap().allowed_ips,
			vec!["10.0.0.2/32".parse::<IpNet>().unwrap()]
		);
	}
}
