// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! wg(4) control through ioctls on an AF_INET datagram socket.
//!
//! Only OpenBSD has this interface. Elsewhere [`KernelDriver::open_channel`]
//! fails with `Unsupported` and the daemon can run with the memory driver.

use crate::driver::{ControlChannel, Driver};
use std::io;

#[derive(Debug, Clone, Copy, Default)]
pub struct KernelDriver;

impl KernelDriver {
	pub fn new() -> Self {
		Self
	}
}

#[cfg(target_os = "openbsd")]
impl Driver for KernelDriver {
	fn open_channel(&self) -> io::Result<Box<dyn ControlChannel>> {
		Ok(Box::new(imp::SocketChannel::open()?))
	}
}

#[cfg(not(target_os = "openbsd"))]
impl Driver for KernelDriver {
	fn open_channel(&self) -> io::Result<Box<dyn ControlChannel>> {
		Err(io::Error::new(
			io::ErrorKind::Unsupported,
			"wg(4) control requires OpenBSD; use the memory driver on this host",
		))
	}
}

#[cfg(target_os = "openbsd")]
mod imp {
	use crate::driver::ControlChannel;
	use crate::handle::IfName;
	use crate::wire::IFNAMSIZ;
	use libc::{c_int, c_ulong, c_void};
	use std::io;
	use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};

	const SIOCIFCREATE: c_ulong = 0x8020_697a;
	const SIOCIFDESTROY: c_ulong = 0x8020_6979;
	const SIOCSWG: c_ulong = 0xc020_69d2;
	const SIOCGWG: c_ulong = 0xc020_69d3;

	/// `struct ifreq`: the name followed by a 16 byte union.
	#[repr(C)]
	struct IfReq {
		name: [u8; IFNAMSIZ],
		ifru: [u8; 16],
	}

	/// `struct wg_data_io`.
	#[repr(C)]
	struct WgDataIo {
		name: [u8; IFNAMSIZ],
		size: usize,
		interface: *mut c_void,
	}

	pub(super) struct SocketChannel {
		fd: Option<OwnedFd>,
	}

	impl SocketChannel {
		pub(super) fn open() -> io::Result<Self> {
			let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
			if fd < 0 {
				return Err(io::Error::last_os_error());
			}
			// The descriptor was just returned by socket(2) and is owned by nothing else.
			let fd = unsafe { OwnedFd::from_raw_fd(fd) };
			Ok(Self { fd: Some(fd) })
		}

		fn raw(&self) -> io::Result<c_int> {
			self.fd
				.as_ref()
				.map(AsRawFd::as_raw_fd)
				.ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
		}

		fn ifreq(&self, request: c_ulong, name: &IfName) -> io::Result<()> {
			let mut ifr = IfReq {
				name: name.to_bytes(),
				ifru: [0; 16],
			};
			let rc = unsafe { libc::ioctl(self.raw()?, request, &mut ifr as *mut IfReq) };
			if rc < 0 {
				return Err(last_error());
			}
			Ok(())
		}

		fn wg(&self, request: c_ulong, name: &IfName, buf: &mut [u8]) -> io::Result<usize> {
			let mut data = WgDataIo {
				name: name.to_bytes(),
				size: buf.len(),
				interface: buf.as_mut_ptr().cast(),
			};
			// The kernel writes at most `size` bytes through `interface`.
			let rc = unsafe { libc::ioctl(self.raw()?, request, &mut data as *mut WgDataIo) };
			if rc < 0 {
				return Err(last_error());
			}
			Ok(data.size)
		}
	}

	impl ControlChannel for SocketChannel {
		fn create(&self, name: &IfName) -> io::Result<()> {
			self.ifreq(SIOCIFCREATE, name)
		}

		fn destroy(&self, name: &IfName) -> io::Result<()> {
			self.ifreq(SIOCIFDESTROY, name)
		}

		fn get(&self, name: &IfName, buf: &mut [u8]) -> io::Result<usize> {
			self.wg(SIOCGWG, name, buf)
		}

		fn set(&self, name: &IfName, buf: &mut [u8]) -> io::Result<()> {
			self.wg(SIOCSWG, name, buf).map(drop)
		}

		fn close(&mut self) -> io::Result<()> {
			if let Some(fd) = self.fd.take() {
				if unsafe { libc::close(fd.into_raw_fd()) } < 0 {
					return Err(io::Error::last_os_error());
				}
			}
			Ok(())
		}
	}

	/// ENXIO is how the kernel says the interface is missing.
	fn last_error() -> io::Error {
		let err = io::Error::last_os_error();
		match err.raw_os_error() {
			Some(libc::ENXIO) => io::Error::new(io::ErrorKind::NotFound, err),
			_ => err,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	#[cfg(not(target_os = "openbsd"))]
	fn kernel_driver_is_unsupported_off_openbsd() {
		let err = KernelDriver::new().open_channel().err().unwrap();
		assert_eq!(err.kind(), io::ErrorKind::Unsupported);
	}

	#[test]
	#[cfg(not(target_os = "openbsd"))]
	fn handle_open_surfaces_unsupported_as_os_error() {
		let err = crate::WgHandle::open(&KernelDriver::new(), "wg0").unwrap_err();
		assert!(matches!(err, crate::WgError::Os { .. }));
	}
}
