// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! fwvpnd binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fwvpn_server_config::{DriverKind, FwConfig};
use fwvpn_wg_iface::{Driver, KernelDriver, MemoryDriver};
use fwvpnd::Daemon;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// fwvpnd - VPN control-plane daemon.
#[derive(Parser, Debug)]
#[command(name = "fwvpnd", about = "VPN control-plane daemon", version)]
struct Args {
	/// Config file to read instead of /etc/fwvpn/fwvpnd.toml
	#[arg(short, long, env = "FWVPN_CONFIG")]
	config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => fwvpn_server_config::load_config_with_file(path)
			.with_context(|| format!("loading {}", path.display()))?,
		None => fwvpn_server_config::load_config().context("loading configuration")?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		interface = %config.wireguard.interface,
		listen_port = config.wireguard.listen_port,
		database = %config.database.path,
		driver = %config.wireguard.driver,
		"starting fwvpnd"
	);

	Ok(run(config).await)
}

async fn run(config: FwConfig) -> ExitCode {
	let driver: Box<dyn Driver> = match config.wireguard.driver {
		DriverKind::Kernel => Box::new(KernelDriver::new()),
		DriverKind::Memory => {
			tracing::warn!("memory driver selected; no kernel interface will be configured");
			Box::new(MemoryDriver::new())
		}
	};

	let mut daemon = match Daemon::init(Some(config), driver.as_ref()).await {
		Ok(daemon) => daemon,
		Err(e) => {
			tracing::error!(error = %e, "initialization failed");
			return ExitCode::from(e.exit_code());
		}
	};

	if let Err(e) = daemon.start().await {
		tracing::error!(error = %e, "start failed");
		daemon.cleanup().await;
		return ExitCode::from(e.exit_code());
	}

	tracing::info!(public_key = %daemon.public_key(), "fwvpnd ready");
	wait_for_shutdown(&daemon).await;

	tracing::info!("shutting down");
	daemon.cleanup().await;
	ExitCode::SUCCESS
}

async fn wait_for_shutdown(daemon: &Daemon) {
	let mut ticker = tokio::time::interval(STATS_INTERVAL);
	ticker.tick().await;

	#[cfg(unix)]
	let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
		Ok(signal) => Some(signal),
		Err(e) => {
			tracing::warn!(error = %e, "cannot listen for SIGTERM");
			None
		}
	};

	loop {
		#[cfg(unix)]
		let terminate = async {
			match sigterm.as_mut() {
				Some(signal) => {
					signal.recv().await;
				}
				None => std::future::pending::<()>().await,
			}
		};
		#[cfg(not(unix))]
		let terminate = std::future::pending::<()>();

		tokio::select! {
			result = tokio::signal::ctrl_c() => {
				if let Err(e) = result {
					tracing::warn!(error = %e, "ctrl-c handler failed");
				}
				tracing::info!("received SIGINT");
				return;
			}
			_ = terminate => {
				tracing::info!("received SIGTERM");
				return;
			}
			_ = ticker.tick() => match daemon.stats() {
				Ok(stats) => tracing::info!(
					peers = stats.peer_count,
					connected = stats.connected_peers,
					rx_bytes = stats.rx_bytes,
					tx_bytes = stats.tx_bytes,
					"peer stats"
				),
				Err(e) => tracing::warn!(error = %e, "failed to collect peer stats"),
			},
		}
	}
}
