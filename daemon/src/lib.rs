// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! fwvpnd: keeps one WireGuard interface in step with the stored VPN
//! assignments and provisions new accounts onto it.

pub mod daemon;
pub mod error;
pub mod ip_allocator;
pub mod reconcile;
pub mod status;

pub use daemon::Daemon;
pub use error::{FwError, Result};
pub use ip_allocator::IpAllocator;
pub use reconcile::{PeerChange, ReconcileFailure, ReconcileReport};
pub use status::{DaemonState, DaemonStats, PeerState, PeerStatus};
