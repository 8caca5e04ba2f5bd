// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{Result, WgError};
use crate::handle::{IfName, WgHandle};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A [`WgHandle`] shared between threads.
///
/// Reads (`get`, `get_peer`, `list_peers`) take the read lock and may run
/// together. Anything that changes the interface needs the write lock, so
/// concurrent peer mutations are serialized.
#[derive(Debug)]
pub struct WgInterface {
	name: IfName,
	handle: RwLock<WgHandle>,
}

impl WgInterface {
	pub fn new(handle: WgHandle) -> Self {
		Self {
			name: handle.name().clone(),
			handle: RwLock::new(handle),
		}
	}

	pub fn name(&self) -> &IfName {
		&self.name
	}

	pub fn read(&self) -> Result<RwLockReadGuard<'_, WgHandle>> {
		self.handle.read().map_err(|_| WgError::LockPoisoned)
	}

	pub fn write(&self) -> Result<RwLockWriteGuard<'_, WgHandle>> {
		self.handle.write().map_err(|_| WgError::LockPoisoned)
	}

	/// Unwraps the handle, recovering it from a poisoned lock.
	pub fn into_inner(self) -> WgHandle {
		self.handle
			.into_inner()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::MemoryDriver;
	use crate::peers::Peer;
	use crate::wire::WG_PEERS_MAX;
	use fwvpn_wg_keys::WgPublicKey;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn concurrent_adds_are_all_applied() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let iface = Arc::new(WgInterface::new(handle));

		let workers: Vec<_> = (0..8u8)
			.map(|t| {
				let iface = Arc::clone(&iface);
				thread::spawn(move || {
					for n in 0..16u8 {
						let mut bytes = [0u8; 32];
						bytes[0] = t;
						bytes[1] = n;
						let peer = Peer::new(WgPublicKey::from_bytes(bytes))
							.with_allowed_ip(format!("10.{t}.{n}.1/32").parse().unwrap());
						iface.write().unwrap().add_peer(&peer).unwrap();
					}
				})
			})
			.collect();
		for worker in workers {
			worker.join().unwrap();
		}

		assert_eq!(iface.read().unwrap().peer_count().unwrap(), 128);
		assert_eq!(driver.peer_count("wg0"), 128);
	}

	#[test]
	fn concurrent_adds_never_exceed_capacity() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let iface = Arc::new(WgInterface::new(handle));

		let workers: Vec<_> = (0..4u16)
			.map(|t| {
				let iface = Arc::clone(&iface);
				thread::spawn(move || {
					let mut rejected = 0;
					for n in 0..300u16 {
						let id = t * 300 + n;
						let mut bytes = [0u8; 32];
						bytes[..2].copy_from_slice(&id.to_be_bytes());
						let peer = Peer::new(WgPublicKey::from_bytes(bytes));
						if iface.write().unwrap().add_peer(&peer).is_err() {
							rejected += 1;
						}
					}
					rejected
				})
			})
			.collect();
		let rejected: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

		assert_eq!(driver.peer_count("wg0"), WG_PEERS_MAX);
		assert_eq!(rejected, 1200 - WG_PEERS_MAX);
	}

	#[test]
	fn readers_share_the_lock() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		let iface = WgInterface::new(handle);

		let first = iface.read().unwrap();
		let second = iface.read().unwrap();
		assert_eq!(first.get().unwrap(), second.get().unwrap());
	}

	#[test]
	fn into_inner_returns_the_handle() {
		let driver = MemoryDriver::new();
		let iface = WgInterface::new(WgHandle::open(&driver, "wg0").unwrap());
		assert_eq!(iface.name().as_str(), "wg0");
		let mut handle = iface.into_inner();
		assert!(handle.is_open());
		handle.close();
		assert_eq!(driver.channels_open(), 0);
	}
}
