// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Address of the account API. fwvpnd only carries it for the API process.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_LISTEN_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_LISTEN_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
	pub listen_addr: IpAddr,
	pub listen_port: u16,
}

impl ApiConfig {
	pub fn socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.listen_addr, self.listen_port)
	}
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			listen_addr: DEFAULT_LISTEN_ADDR,
			listen_port: DEFAULT_LISTEN_PORT,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfigLayer {
	#[serde(default)]
	pub listen_addr: Option<IpAddr>,
	#[serde(default)]
	pub listen_port: Option<u16>,
}

impl ApiConfigLayer {
	pub fn merge(&mut self, other: ApiConfigLayer) {
		if other.listen_addr.is_some() {
			self.listen_addr = other.listen_addr;
		}
		if other.listen_port.is_some() {
			self.listen_port = other.listen_port;
		}
	}

	pub fn finalize(self) -> ApiConfig {
		ApiConfig {
			listen_addr: self.listen_addr.unwrap_or(DEFAULT_LISTEN_ADDR),
			listen_port: self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
		}
	}
}
