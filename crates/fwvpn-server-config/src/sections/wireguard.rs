// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tunnel interface configuration.

use ipnet::Ipv4Net;
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

const DEFAULT_INTERFACE: &str = "wg0";
const DEFAULT_LISTEN_PORT: u16 = 51820;
const DEFAULT_SERVER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DEFAULT_KEEPALIVE_SECS: u16 = 25;

fn default_subnet() -> Ipv4Net {
	Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap_or_default()
}

/// Which control channel the daemon talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
	/// wg(4) through ioctls.
	#[default]
	Kernel,
	/// In-process interface, for dry runs.
	Memory,
}

impl FromStr for DriverKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"kernel" => Ok(Self::Kernel),
			"memory" => Ok(Self::Memory),
			other => Err(format!("unknown driver '{other}', expected 'kernel' or 'memory'")),
		}
	}
}

impl fmt::Display for DriverKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Kernel => f.write_str("kernel"),
			Self::Memory => f.write_str("memory"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireguardConfig {
	pub interface: String,
	pub listen_port: u16,
	pub server_addr: Ipv4Addr,
	pub subnet: Ipv4Net,
	/// Server private key file; a fresh key is generated per run when unset.
	pub key_file: Option<PathBuf>,
	pub driver: DriverKind,
	/// Keepalive given to provisioned peers.
	pub keepalive_secs: u16,
}

impl Default for WireguardConfig {
	fn default() -> Self {
		Self {
			interface: DEFAULT_INTERFACE.to_string(),
			listen_port: DEFAULT_LISTEN_PORT,
			server_addr: DEFAULT_SERVER_ADDR,
			subnet: default_subnet(),
			key_file: None,
			driver: DriverKind::default(),
			keepalive_secs: DEFAULT_KEEPALIVE_SECS,
		}
	}
}

impl WireguardConfig {
	/// The server address must be a host address inside the subnet, and the
	/// subnet must leave room for at least one client.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let subnet = self.subnet.trunc();
		if subnet.prefix_len() > 30 {
			return Err(ConfigError::Validation(format!(
				"VPN subnet {subnet} has no room for clients"
			)));
		}
		if !subnet.contains(&self.server_addr) {
			return Err(ConfigError::Validation(format!(
				"server address {} is outside VPN subnet {subnet}",
				self.server_addr
			)));
		}
		if self.server_addr == subnet.network() || self.server_addr == subnet.broadcast() {
			return Err(ConfigError::Validation(format!(
				"server address {} is not a host address of {subnet}",
				self.server_addr
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireguardConfigLayer {
	#[serde(default)]
	pub interface: Option<String>,
	#[serde(default)]
	pub listen_port: Option<u16>,
	#[serde(default)]
	pub server_addr: Option<Ipv4Addr>,
	#[serde(default)]
	pub subnet: Option<Ipv4Net>,
	#[serde(default)]
	pub key_file: Option<PathBuf>,
	#[serde(default)]
	pub driver: Option<DriverKind>,
	#[serde(default)]
	pub keepalive_secs: Option<u16>,
}

impl WireguardConfigLayer {
	pub fn merge(&mut self, other: WireguardConfigLayer) {
		if other.interface.is_some() {
			self.interface = other.interface;
		}
		if other.listen_port.is_some() {
			self.listen_port = other.listen_port;
		}
		if other.server_addr.is_some() {
			self.server_addr = other.server_addr;
		}
		if other.subnet.is_some() {
			self.subnet = other.subnet;
		}
		if other.key_file.is_some() {
			self.key_file = other.key_file;
		}
		if other.driver.is_some() {
			self.driver = other.driver;
		}
		if other.keepalive_secs.is_some() {
			self.keepalive_secs = other.keepalive_secs;
		}
	}

	pub fn finalize(self) -> WireguardConfig {
		WireguardConfig {
			interface: self.interface.unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
			listen_port: self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
			server_addr: self.server_addr.unwrap_or(DEFAULT_SERVER_ADDR),
			subnet: self.subnet.unwrap_or_else(default_subnet),
			key_file: self.key_file,
			driver: self.driver.unwrap_or_default(),
			keepalive_secs: self.keepalive_secs.unwrap_or(DEFAULT_KEEPALIVE_SECS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(server: &str, subnet: &str) -> WireguardConfig {
		WireguardConfig {
			server_addr: server.parse().unwrap(),
			subnet: subnet.parse().unwrap(),
			..Default::default()
		}
	}

	#[test]
	fn test_defaults() {
		let config = WireguardConfigLayer::default().finalize();
		assert_eq!(config.interface, "wg0");
		assert_eq!(config.listen_port, 51820);
		assert_eq!(config.server_addr, Ipv4Addr::new(10, 0, 0, 1));
		assert_eq!(config.subnet.to_string(), "10.0.0.0/24");
		assert_eq!(config.driver, DriverKind::Kernel);
		assert_eq!(config.keepalive_secs, 25);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_server_outside_subnet() {
		let err = config("10.1.0.1", "10.0.0.0/24").validate().unwrap_err();
		assert!(err.to_string().contains("outside"));
	}

	#[test]
	fn test_server_on_network_or_broadcast() {
		assert!(config("10.0.0.0", "10.0.0.0/24").validate().is_err());
		assert!(config("10.0.0.255", "10.0.0.0/24").validate().is_err());
		assert!(config("10.0.0.254", "10.0.0.0/24").validate().is_ok());
	}

	#[test]
	fn test_subnet_too_small() {
		assert!(config("10.0.0.1", "10.0.0.0/31").validate().is_err());
		assert!(config("10.0.0.1", "10.0.0.0/30").validate().is_ok());
	}

	#[test]
	fn test_driver_parsing() {
		assert_eq!("memory".parse::<DriverKind>().unwrap(), DriverKind::Memory);
		assert_eq!("KERNEL".parse::<DriverKind>().unwrap(), DriverKind::Kernel);
		assert!("bogus".parse::<DriverKind>().is_err());
		assert_eq!(DriverKind::Memory.to_string(), "memory");
	}
}
