// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for fwvpnd.
//!
//! Layered from built-in defaults, a TOML file (`/etc/fwvpn/fwvpnd.toml`) and
//! `FWVPN_*` environment variables, in increasing precedence.

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::FwConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;
use tracing::{debug, info};

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FwConfig {
	pub database: DatabaseConfig,
	pub api: ApiConfig,
	pub wireguard: WireguardConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FWVPN_*`)
/// 2. Config file (`/etc/fwvpn/fwvpnd.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<FwConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<FwConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

pub fn load_from(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<FwConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = FwConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize a merged layer into a validated config.
pub fn finalize(layer: FwConfigLayer) -> Result<FwConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let api = layer.api.unwrap_or_default().finalize();
	let wireguard = layer.wireguard.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	wireguard.validate()?;

	info!(
		database = %database.path,
		interface = %wireguard.interface,
		listen_port = wireguard.listen_port,
		server_addr = %wireguard.server_addr,
		subnet = %wireguard.subnet,
		driver = %wireguard.driver,
		key_file = ?wireguard.key_file,
		"configuration loaded"
	);

	Ok(FwConfig {
		database,
		api,
		wireguard,
		logging,
	})
}
