// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Hands out client addresses from the VPN subnet.
///
/// Candidates are the subnet's host addresses in ascending order, minus the
/// server address and anything already taken.
#[derive(Debug, Clone)]
pub struct IpAllocator {
	subnet: Ipv4Net,
	server: Ipv4Addr,
}

impl IpAllocator {
	pub fn new(subnet: Ipv4Net, server: Ipv4Addr) -> Self {
		Self {
			subnet: subnet.trunc(),
			server,
		}
	}

	pub fn next_available(&self, taken: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
		self.subnet
			.hosts()
			.find(|ip| *ip != self.server && !taken.contains(ip))
	}

	/// Number of client addresses the subnet can hold.
	pub fn capacity(&self) -> usize {
		self.subnet
			.hosts()
			.filter(|ip| *ip != self.server)
			.count()
	}

	/// Free client addresses left once `taken` is excluded. Taken addresses
	/// outside the pool are ignored.
	pub fn remaining(&self, taken: &HashSet<Ipv4Addr>) -> usize {
		self.subnet
			.hosts()
			.filter(|ip| *ip != self.server && !taken.contains(ip))
			.count()
	}
}
