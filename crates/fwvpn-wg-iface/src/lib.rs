// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Control plane for one WireGuard interface.
//!
//! - [`WgHandle`]: the control channel bound to an interface name, with
//!   create/destroy/close
//! - [`InterfaceConfig`]: partial structural get/set through the handle
//! - peer directory: [`WgHandle::add_peer`], [`WgHandle::remove_peer`],
//!   [`WgHandle::get_peer`], [`WgHandle::list_peers`]
//! - [`WgInterface`]: the handle behind a read/write lock
//! - drivers: [`KernelDriver`] for wg(4), [`MemoryDriver`] for dry runs and tests

pub mod config;
pub mod driver;
pub mod error;
pub mod handle;
pub mod interface;
pub mod kernel;
pub mod memory;
pub mod peers;
pub mod wire;

pub use config::InterfaceConfig;
pub use driver::{ControlChannel, Driver};
pub use error::{Result, WgError};
pub use handle::{IfName, IfaceState, WgHandle};
pub use interface::WgInterface;
pub use kernel::KernelDriver;
pub use memory::{Fault, MemoryDriver};
pub use peers::{ApplyReport, Peer, PeerFlags};
pub use wire::{MessageShape, WG_PEERS_MAX};
