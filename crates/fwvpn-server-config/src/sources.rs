// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::FwConfigLayer;
use crate::sections::{
	ApiConfigLayer, DatabaseConfigLayer, DriverKind, LoggingConfigLayer, WireguardConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<FwConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<FwConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(FwConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/fwvpn/fwvpnd.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<FwConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(FwConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: FwConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FWVPN_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<FwConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(FwConfigLayer {
			database: Some(DatabaseConfigLayer {
				path: env_var("FWVPN_DB_PATH"),
			}),
			api: Some(ApiConfigLayer {
				listen_addr: env_parse("FWVPN_LISTEN_ADDR")?,
				listen_port: env_u16("FWVPN_LISTEN_PORT")?,
			}),
			wireguard: Some(load_wireguard_from_env()?),
			logging: Some(LoggingConfigLayer {
				level: env_var("FWVPN_LOG_LEVEL"),
			}),
		})
	}
}

fn load_wireguard_from_env() -> Result<WireguardConfigLayer, ConfigError> {
	let driver = match env_var("FWVPN_WG_DRIVER") {
		Some(v) => Some(DriverKind::from_str(&v).map_err(|message| ConfigError::InvalidValue {
			key: "FWVPN_WG_DRIVER".to_string(),
			message,
		})?),
		None => None,
	};

	Ok(WireguardConfigLayer {
		interface: env_var("FWVPN_WG_IFACE"),
		listen_port: env_u16("FWVPN_WG_PORT")?,
		server_addr: env_parse("FWVPN_SERVER_ADDR")?,
		subnet: env_parse("FWVPN_VPN_SUBNET")?,
		key_file: env_var("FWVPN_WG_KEY_FILE").map(PathBuf::from),
		driver,
		keepalive_secs: env_u16("FWVPN_WG_KEEPALIVE")?,
	})
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("'{v}': {e}"),
		}),
		None => Ok(None),
	}
}
