// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process stand-in for the wg(4) driver.
//!
//! Requests and responses use the same byte layout as the kernel, so
//! everything above the [`ControlChannel`] is exercised unchanged. Used for
//! dry runs on hosts without wg(4) and throughout the tests, with one-shot
//! fault injection.

use crate::driver::{ControlChannel, Driver};
use crate::handle::IfName;
use crate::peers::Peer;
use crate::wire::{self, WG_PEERS_MAX};
use crate::InterfaceConfig;
use chrono::{DateTime, Utc};
use fwvpn_wg_keys::{WgPrivateKey, WgPublicKey};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Operation that [`MemoryDriver::fail_next`] makes fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
	Open,
	Create,
	Destroy,
	Get,
	Set,
}

#[derive(Debug, Default)]
struct Interface {
	listen_port: Option<u16>,
	private_key: Option<WgPrivateKey>,
	rtable: Option<i32>,
	peers: Vec<Peer>,
}

impl Interface {
	fn snapshot(&self, only: Option<WgPublicKey>) -> InterfaceConfig {
		InterfaceConfig {
			listen_port: self.listen_port,
			public_key: self.private_key.as_ref().map(WgPrivateKey::public_key),
			private_key: self.private_key.clone(),
			rtable: self.rtable,
			replace_peers: false,
			peers: self
				.peers
				.iter()
				.filter(|p| only.map_or(true, |key| p.public_key == key))
				.cloned()
				.collect(),
		}
	}

	fn apply(&mut self, request: InterfaceConfig) -> io::Result<()> {
		if let Some(port) = request.listen_port {
			self.listen_port = Some(port);
		}
		if let Some(key) = request.private_key {
			self.private_key = Some(key);
		}
		if let Some(rtable) = request.rtable {
			self.rtable = Some(rtable);
		}
		if request.replace_peers {
			self.peers.clear();
		}

		for entry in request.peers {
			if entry.flags.remove {
				self.peers.retain(|p| p.public_key != entry.public_key);
				continue;
			}

			match self.peers.iter_mut().find(|p| p.public_key == entry.public_key) {
				Some(existing) => {
					if entry.flags.replace_allowed_ips {
						existing.allowed_ips.clear();
					}
					for net in entry.allowed_ips {
						if !existing.allowed_ips.contains(&net) {
							existing.allowed_ips.push(net);
						}
					}
					if entry.persistent_keepalive.is_some() {
						existing.persistent_keepalive = entry.persistent_keepalive;
					}
					if entry.endpoint.is_some() {
						existing.endpoint = entry.endpoint;
					}
				}
				None if entry.flags.update_only => {}
				None => {
					let mut peer = Peer::new(entry.public_key);
					peer.allowed_ips = entry.allowed_ips;
					peer.persistent_keepalive = entry.persistent_keepalive;
					peer.endpoint = entry.endpoint;
					self.peers.push(peer);
				}
			}
		}

		if self.peers.len() > WG_PEERS_MAX {
			return Err(io::Error::other(format!(
				"{} peers exceeds the limit of {WG_PEERS_MAX}",
				self.peers.len()
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Default)]
struct MemoryKernel {
	interfaces: HashMap<String, Interface>,
	creates: HashMap<String, usize>,
	faults: HashSet<Fault>,
	rejected: HashSet<WgPublicKey>,
	opened: usize,
	closed: usize,
}

impl MemoryKernel {
	fn take_fault(&mut self, fault: Fault) -> io::Result<()> {
		if self.faults.remove(&fault) {
			return Err(io::Error::other(format!("injected {fault:?} failure")));
		}
		Ok(())
	}

	fn interface_mut(&mut self, name: &IfName) -> io::Result<&mut Interface> {
		self.interfaces
			.get_mut(name.as_str())
			.ok_or_else(|| no_such_interface(name))
	}
}

fn no_such_interface(name: &IfName) -> io::Error {
	io::Error::new(io::ErrorKind::NotFound, format!("{name}: no such interface"))
}

/// Shared in-memory kernel. Clones see the same interfaces.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
	kernel: Arc<Mutex<MemoryKernel>>,
}

impl MemoryDriver {
	pub fn new() -> Self {
		Self::default()
	}

	fn kernel(&self) -> MutexGuard<'_, MemoryKernel> {
		lock(&self.kernel)
	}

	/// Makes the next `fault` operation fail with an OS error.
	pub fn fail_next(&self, fault: Fault) {
		self.kernel().faults.insert(fault);
	}

	/// Makes every set that adds or updates `key` fail.
	pub fn reject_peer(&self, key: WgPublicKey) {
		self.kernel().rejected.insert(key);
	}

	pub fn interface_exists(&self, name: &str) -> bool {
		self.kernel().interfaces.contains_key(name)
	}

	/// Number of successful creates of `name` so far.
	pub fn create_count(&self, name: &str) -> usize {
		self.kernel().creates.get(name).copied().unwrap_or(0)
	}

	pub fn channels_open(&self) -> usize {
		let kernel = self.kernel();
		kernel.opened - kernel.closed
	}

	pub fn channels_closed(&self) -> usize {
		self.kernel().closed
	}

	pub fn peer_count(&self, name: &str) -> usize {
		self.kernel()
			.interfaces
			.get(name)
			.map_or(0, |iface| iface.peers.len())
	}

	/// Simulates traffic from `key`: records a handshake and adds to its counters.
	pub fn record_handshake(&self, name: &str, key: &WgPublicKey, at: DateTime<Utc>, rx: u64, tx: u64) {
		let mut kernel = self.kernel();
		if let Some(peer) = kernel
			.interfaces
			.get_mut(name)
			.and_then(|iface| iface.peers.iter_mut().find(|p| p.public_key == *key))
		{
			peer.last_handshake = Some(at);
			peer.rx_bytes += rx;
			peer.tx_bytes += tx;
		}
	}
}

impl Driver for MemoryDriver {
	fn open_channel(&self) -> io::Result<Box<dyn ControlChannel>> {
		let mut kernel = self.kernel();
		kernel.take_fault(Fault::Open)?;
		kernel.opened += 1;
		Ok(Box::new(MemoryChannel {
			kernel: Arc::clone(&self.kernel),
		}))
	}
}

struct MemoryChannel {
	kernel: Arc<Mutex<MemoryKernel>>,
}

impl ControlChannel for MemoryChannel {
	fn create(&self, name: &IfName) -> io::Result<()> {
		let mut kernel = lock(&self.kernel);
		kernel.take_fault(Fault::Create)?;
		if kernel.interfaces.contains_key(name.as_str()) {
			return Err(io::Error::new(
				io::ErrorKind::AlreadyExists,
				format!("{name}: interface exists"),
			));
		}
		kernel.interfaces.insert(name.to_string(), Interface::default());
		*kernel.creates.entry(name.to_string()).or_default() += 1;
		Ok(())
	}

	fn destroy(&self, name: &IfName) -> io::Result<()> {
		let mut kernel = lock(&self.kernel);
		kernel.take_fault(Fault::Destroy)?;
		kernel
			.interfaces
			.remove(name.as_str())
			.map(drop)
			.ok_or_else(|| no_such_interface(name))
	}

	fn get(&self, name: &IfName, buf: &mut [u8]) -> io::Result<usize> {
		let mut kernel = lock(&self.kernel);
		kernel.take_fault(Fault::Get)?;
		let seed = wire::seeded_peer_key(buf);
		let snapshot = kernel.interface_mut(name)?.snapshot(seed);
		let response = wire::encode(&snapshot).map_err(io::Error::other)?;

		trace!(ifname = %name, offered = buf.len(), required = response.len(), "memory get");
		if response.len() <= buf.len() {
			buf[..response.len()].copy_from_slice(&response);
		}
		Ok(response.len())
	}

	fn set(&self, name: &IfName, buf: &mut [u8]) -> io::Result<()> {
		let mut kernel = lock(&self.kernel);
		kernel.take_fault(Fault::Set)?;
		let request = wire::decode(buf)
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

		if let Some(peer) = request
			.peers
			.iter()
			.find(|p| !p.flags.remove && kernel.rejected.contains(&p.public_key))
		{
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("peer {} rejected", peer.public_key),
			));
		}

		// Apply to a copy so a rejected request leaves the interface unchanged.
		let iface = kernel.interface_mut(name)?;
		let mut next = Interface {
			listen_port: iface.listen_port,
			private_key: iface.private_key.clone(),
			rtable: iface.rtable,
			peers: iface.peers.clone(),
		};
		next.apply(request)?;
		*iface = next;
		Ok(())
	}

	fn close(&mut self) -> io::Result<()> {
		lock(&self.kernel).closed += 1;
		Ok(())
	}
}

fn lock(kernel: &Mutex<MemoryKernel>) -> MutexGuard<'_, MemoryKernel> {
	kernel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handle::WgHandle;

	#[test]
	fn interfaces_are_shared_between_clones() {
		let driver = MemoryDriver::new();
		let other = driver.clone();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		assert!(other.interface_exists("wg0"));
	}

	#[test]
	fn faults_fire_once() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		driver.fail_next(Fault::Create);
		assert!(handle.create().is_err());
		assert!(handle.create().is_ok());
	}

	#[test]
	fn get_offers_required_size_without_writing_short_buffers() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		handle
			.add_peer(&Peer::new(WgPublicKey::from_bytes([1; 32])).with_allowed_ip("10.0.0.2/32".parse().unwrap()))
			.unwrap();

		let channel = driver.open_channel().unwrap();
		let name = IfName::new("wg0").unwrap();
		let mut short = vec![0u8; wire::INTERFACE_IO_SIZE];
		let required = channel.get(&name, &mut short).unwrap();
		assert_eq!(required, wire::MessageShape::with_peers(1, 1).unwrap().size());
		assert!(short.iter().all(|b| *b == 0));
	}

	#[test]
	fn seeded_get_returns_only_the_seeded_peer() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		for n in 1..=3u8 {
			handle.add_peer(&Peer::new(WgPublicKey::from_bytes([n; 32]))).unwrap();
		}

		let seed = InterfaceConfig::default().with_peer(Peer::new(WgPublicKey::from_bytes([2; 32])));
		let mut buf = wire::encode(&seed).unwrap();
		let channel = driver.open_channel().unwrap();
		let required = channel.get(&IfName::new("wg0").unwrap(), &mut buf).unwrap();
		let response = wire::decode(&buf[..required]).unwrap();
		assert_eq!(response.peers.len(), 1);
		assert_eq!(response.peers[0].public_key, WgPublicKey::from_bytes([2; 32]));
	}

	#[test]
	fn rejected_set_changes_nothing() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let bad = WgPublicKey::from_bytes([9; 32]);
		driver.reject_peer(bad);

		let config = InterfaceConfig::default()
			.with_listen_port(51820)
			.with_peer(Peer::new(bad));
		assert!(handle.set(&config).is_err());
		assert_eq!(handle.listen_port().unwrap(), None);
		assert_eq!(driver.peer_count("wg0"), 0);
	}

	#[test]
	fn update_only_does_not_create() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let mut peer = Peer::new(WgPublicKey::from_bytes([4; 32]));
		peer.flags.update_only = true;
		handle.set(&InterfaceConfig::default().with_peer(peer)).unwrap();
		assert_eq!(driver.peer_count("wg0"), 0);
	}

	#[test]
	fn replace_peers_clears_the_set() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		for n in 1..=3u8 {
			handle.add_peer(&Peer::new(WgPublicKey::from_bytes([n; 32]))).unwrap();
		}
		let config = InterfaceConfig {
			replace_peers: true,
			..InterfaceConfig::default().with_peer(Peer::new(WgPublicKey::from_bytes([7; 32])))
		};
		handle.set(&config).unwrap();
		let peers = handle.list_peers().unwrap();
		assert_eq!(peers.len(), 1);
		assert_eq!(peers[0].public_key, WgPublicKey::from_bytes([7; 32]));
	}

	#[test]
	fn handshake_shows_up_in_get() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let key = WgPublicKey::from_bytes([5; 32]);
		handle.add_peer(&Peer::new(key)).unwrap();

		let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
		driver.record_handshake("wg0", &key, at, 100, 200);
		let peer = handle.get_peer(&key).unwrap();
		assert_eq!(peer.last_handshake, Some(at));
		assert_eq!(peer.rx_bytes, 100);
		assert_eq!(peer.tx_bytes, 200);
	}
}
