// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The seam between a [`WgHandle`](crate::WgHandle) and the operating system.
//!
//! A [`Driver`] opens control channels. A [`ControlChannel`] carries the
//! interface lifecycle requests and the structural get/set messages laid out
//! by [`crate::wire`].

use crate::handle::IfName;
use std::io;

pub trait Driver: Send + Sync {
	fn open_channel(&self) -> io::Result<Box<dyn ControlChannel>>;
}

pub trait ControlChannel: Send + Sync {
	/// Creates the named interface. Fails with `AlreadyExists` if it is present.
	fn create(&self, name: &IfName) -> io::Result<()>;

	/// Destroys the named interface. Fails with `NotFound` if it is absent.
	fn destroy(&self, name: &IfName) -> io::Result<()>;

	/// Reads the configuration into `buf`.
	///
	/// `buf` holds the request on entry. Returns the size of the full
	/// response; the response is written only when it fits in `buf`.
	fn get(&self, name: &IfName, buf: &mut [u8]) -> io::Result<usize>;

	/// Applies the configuration message in `buf`.
	fn set(&self, name: &IfName, buf: &mut [u8]) -> io::Result<()>;

	/// Releases the channel. Called at most once per channel.
	fn close(&mut self) -> io::Result<()>;
}
