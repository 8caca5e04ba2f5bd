// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::driver::{ControlChannel, Driver};
use crate::error::{Result, WgError};
use crate::wire::{IFNAMSIZ, INTERFACE_IO_SIZE};
use std::fmt;
use std::sync::atomic::AtomicUsize;
use tracing::{debug, info, instrument, warn};

/// A validated interface name: 1 to 15 bytes, no NUL.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IfName(String);

impl IfName {
	pub fn new(name: &str) -> Result<Self> {
		if name.is_empty() {
			return Err(WgError::InvalidArgument(
				"interface name is empty".to_string(),
			));
		}
		if name.len() >= IFNAMSIZ {
			return Err(WgError::InvalidArgument(format!(
				"interface name {name:?} is longer than {} bytes",
				IFNAMSIZ - 1
			)));
		}
		if name.contains('\0') {
			return Err(WgError::InvalidArgument(format!(
				"interface name {name:?} contains NUL"
			)));
		}
		Ok(Self(name.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// NUL-padded form used in control requests.
	pub fn to_bytes(&self) -> [u8; IFNAMSIZ] {
		let mut out = [0u8; IFNAMSIZ];
		out[..self.0.len()].copy_from_slice(self.0.as_bytes());
		out
	}
}

impl fmt::Display for IfName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for IfName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", self.0)
	}
}

/// Whether this handle has created the kernel interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfaceState {
	Absent,
	Created,
	Destroyed,
}

/// One control channel bound to one named interface.
///
/// Opening a handle does not create the interface; see [`WgHandle::create`].
pub struct WgHandle {
	name: IfName,
	channel: Option<Box<dyn ControlChannel>>,
	state: IfaceState,
	/// Last response size seen by `get`, used to size the next request.
	pub(crate) size_hint: AtomicUsize,
}

impl WgHandle {
	#[instrument(skip(driver))]
	pub fn open(driver: &dyn Driver, name: &str) -> Result<Self> {
		let name = IfName::new(name)?;
		let channel = driver
			.open_channel()
			.map_err(|e| WgError::os("open control channel", name.as_str(), e))?;
		debug!(ifname = %name, "control channel opened");

		Ok(Self {
			name,
			channel: Some(channel),
			state: IfaceState::Absent,
			size_hint: AtomicUsize::new(INTERFACE_IO_SIZE),
		})
	}

	pub fn name(&self) -> &IfName {
		&self.name
	}

	pub fn state(&self) -> IfaceState {
		self.state
	}

	pub fn is_open(&self) -> bool {
		self.channel.is_some()
	}

	pub(crate) fn channel(&self) -> Result<&dyn ControlChannel> {
		self.channel
			.as_deref()
			.ok_or_else(|| WgError::Closed(self.name.to_string()))
	}

	/// Creates the kernel interface.
	///
	/// A repeat create is not silently accepted: the OS "already exists"
	/// error is returned and [`WgError::is_already_exists`] is true for it.
	#[instrument(skip(self), fields(ifname = %self.name))]
	pub fn create(&mut self) -> Result<()> {
		self.channel()?
			.create(&self.name)
			.map_err(|e| WgError::os("create", self.name.as_str(), e))?;
		self.state = IfaceState::Created;
		info!(ifname = %self.name, "interface created");
		Ok(())
	}

	#[instrument(skip(self), fields(ifname = %self.name))]
	pub fn destroy(&mut self) -> Result<()> {
		self.channel()?
			.destroy(&self.name)
			.map_err(|e| WgError::os("destroy", self.name.as_str(), e))?;
		self.state = IfaceState::Destroyed;
		info!(ifname = %self.name, "interface destroyed");
		Ok(())
	}

	/// Releases the control channel. Safe to call more than once.
	pub fn close(&mut self) {
		if let Some(mut channel) = self.channel.take() {
			if let Err(e) = channel.close() {
				warn!(ifname = %self.name, error = %e, "failed to close control channel");
			} else {
				debug!(ifname = %self.name, "control channel closed");
			}
		}
	}
}

impl Drop for WgHandle {
	fn drop(&mut self) {
		self.close();
	}
}

impl fmt::Debug for WgHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgHandle")
			.field("name", &self.name)
			.field("open", &self.is_open())
			.field("state", &self.state)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{Fault, MemoryDriver};

	#[test]
	fn name_bounds() {
		assert!(IfName::new("wg0").is_ok());
		assert!(IfName::new("a23456789012345").is_ok());
		assert!(matches!(
			IfName::new("a234567890123456"),
			Err(WgError::InvalidArgument(_))
		));
		assert!(matches!(IfName::new(""), Err(WgError::InvalidArgument(_))));
		assert!(matches!(IfName::new("wg\00"), Err(WgError::InvalidArgument(_))));
	}

	#[test]
	fn name_bytes_are_nul_padded() {
		let bytes = IfName::new("wg0").unwrap().to_bytes();
		assert_eq!(&bytes[..3], b"wg0");
		assert!(bytes[3..].iter().all(|b| *b == 0));
	}

	#[test]
	fn open_rejects_long_name_without_opening_a_channel() {
		let driver = MemoryDriver::new();
		let err = WgHandle::open(&driver, "this-name-is-too-long").unwrap_err();
		assert!(matches!(err, WgError::InvalidArgument(_)));
		assert_eq!(driver.channels_open(), 0);
	}

	#[test]
	fn open_does_not_create_interface() {
		let driver = MemoryDriver::new();
		let handle = WgHandle::open(&driver, "wg0").unwrap();
		assert!(handle.is_open());
		assert_eq!(handle.state(), IfaceState::Absent);
		assert!(!driver.interface_exists("wg0"));
	}

	#[test]
	fn open_failure_is_os_error() {
		let driver = MemoryDriver::new();
		driver.fail_next(Fault::Open);
		let err = WgHandle::open(&driver, "wg0").unwrap_err();
		assert!(matches!(err, WgError::Os { .. }));
	}

	#[test]
	fn close_twice_releases_once() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.close();
		handle.close();
		assert!(!handle.is_open());
		assert_eq!(driver.channels_closed(), 1);
		drop(handle);
		assert_eq!(driver.channels_closed(), 1);
	}

	#[test]
	fn drop_closes_channel() {
		let driver = MemoryDriver::new();
		drop(WgHandle::open(&driver, "wg0").unwrap());
		assert_eq!(driver.channels_closed(), 1);
		assert_eq!(driver.channels_open(), 0);
	}

	#[test]
	fn closed_handle_refuses_requests() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.close();
		assert!(matches!(handle.create(), Err(WgError::Closed(_))));
		assert!(!driver.interface_exists("wg0"));
	}

	#[test]
	fn lifecycle_tracks_state() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		assert_eq!(handle.state(), IfaceState::Created);
		assert!(driver.interface_exists("wg0"));

		handle.destroy().unwrap();
		assert_eq!(handle.state(), IfaceState::Destroyed);
		assert!(!driver.interface_exists("wg0"));
	}

	#[test]
	fn repeat_create_reports_already_exists() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();

		let err = handle.create().unwrap_err();
		assert!(err.is_already_exists());
		assert_eq!(driver.create_count("wg0"), 1);
		assert_eq!(handle.state(), IfaceState::Created);
	}

	#[test]
	fn destroy_missing_interface_reports_not_found() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		let err = handle.destroy().unwrap_err();
		assert!(err.is_no_such_interface());
		assert_eq!(handle.state(), IfaceState::Absent);
	}

	#[test]
	fn create_after_destroy_succeeds() {
		let driver = MemoryDriver::new();
		let mut handle = WgHandle::open(&driver, "wg0").unwrap();
		handle.create().unwrap();
		handle.destroy().unwrap();
		handle.create().unwrap();
		assert_eq!(handle.state(), IfaceState::Created);
		assert_eq!(driver.create_count("wg0"), 2);
	}
}
