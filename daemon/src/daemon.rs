// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The daemon controller: one tunnel interface plus the assignment store.
//!
//! Lifecycle is `init` (Stopped) -> `start` (Running) -> `cleanup`. A failed
//! `start` leaves the daemon in Error with the interface rolled back; only
//! `cleanup` is useful after that.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use fwvpn_server_config::FwConfig;
use fwvpn_server_db::{
	create_pool, run_migrations, AccountRepository, DbError, SqlitePool, VpnAssignment,
	VpnConfigRepository,
};
use fwvpn_wg_iface::{Driver, IfaceState, InterfaceConfig, Peer, WgHandle, WgInterface};
use fwvpn_wg_keys::{get_or_create_key, WgKeyPair, WgPublicKey};
use ipnet::IpNet;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::{FwError, Result};
use crate::ip_allocator::IpAllocator;
use crate::reconcile::{self, host_net, ReconcileReport};
use crate::status::{DaemonState, DaemonStats, PeerStatus};

/// Warn once fewer than 1/N of the pool addresses are free.
const LOW_POOL_DIVISOR: usize = 10;

pub struct Daemon {
	config: FwConfig,
	db: SqlitePool,
	vpn: VpnConfigRepository,
	accounts: AccountRepository,
	iface: WgInterface,
	keypair: WgKeyPair,
	allocator: IpAllocator,
	state: DaemonState,
	peer_count: AtomicUsize,
	last_reconcile: Option<ReconcileReport>,
	/// Serializes address allocation.
	provision_lock: Mutex<()>,
}

impl Daemon {
	/// Opens storage, the interface handle and the server key.
	///
	/// Nothing is created in the kernel yet. Every error path releases what
	/// was acquired before it.
	#[instrument(skip_all)]
	pub async fn init(config: Option<FwConfig>, driver: &dyn Driver) -> Result<Self> {
		let config = config.ok_or_else(|| FwError::generic("daemon configuration is required"))?;

		let db = create_pool(&config.database.path).await?;
		if let Err(e) = run_migrations(&db).await {
			db.close().await;
			return Err(e.into());
		}

		let mut handle = match WgHandle::open(driver, &config.wireguard.interface) {
			Ok(handle) => handle,
			Err(e) => {
				db.close().await;
				return Err(e.into());
			}
		};

		let keypair = match load_server_key(&config).await {
			Ok(keypair) => keypair,
			Err(e) => {
				handle.close();
				db.close().await;
				return Err(e);
			}
		};

		let allocator = IpAllocator::new(config.wireguard.subnet, config.wireguard.server_addr);
		info!(
			ifname = %handle.name(),
			public_key = %keypair.public_key(),
			db = %config.database.path,
			subnet = %config.wireguard.subnet,
			pool_size = allocator.capacity(),
			"daemon initialized"
		);

		Ok(Self {
			allocator,
			vpn: VpnConfigRepository::new(db.clone()),
			accounts: AccountRepository::new(db.clone()),
			iface: WgInterface::new(handle),
			config,
			db,
			keypair,
			state: DaemonState::Stopped,
			peer_count: AtomicUsize::new(0),
			last_reconcile: None,
			provision_lock: Mutex::new(()),
		})
	}

	/// Creates and configures the interface, then reconciles stored peers.
	///
	/// Calling it while Running does nothing.
	#[instrument(skip(self), fields(ifname = %self.iface.name()))]
	pub async fn start(&mut self) -> Result<()> {
		match self.state {
			DaemonState::Running => return Ok(()),
			DaemonState::Error => {
				return Err(FwError::generic(
					"daemon failed to start earlier; clean up and init again",
				))
			}
			DaemonState::Stopped => {}
		}

		if let Err(e) = self.bring_up() {
			self.state = DaemonState::Error;
			return Err(e);
		}

		let assignments = match self.vpn.list_assignments().await {
			Ok(assignments) => assignments,
			Err(e) => {
				error!(error = %e, "failed to read VPN assignments");
				self.tear_down();
				self.state = DaemonState::Error;
				return Err(e.into());
			}
		};

		let report = match self.reconcile_with(&assignments) {
			Ok(report) => report,
			Err(e) => {
				self.tear_down();
				self.state = DaemonState::Error;
				return Err(e);
			}
		};
		if !report.is_clean() {
			warn!(failed = report.failed.len(), "some stored peers could not be applied");
		}
		self.last_reconcile = Some(report);
		self.state = DaemonState::Running;

		info!(
			listen_port = self.config.wireguard.listen_port,
			peers = self.peer_count(),
			"daemon running"
		);
		Ok(())
	}

	fn bring_up(&self) -> Result<()> {
		let mut handle = self.iface.write()?;
		if let Err(e) = handle.create() {
			if e.is_already_exists() {
				error!(ifname = %handle.name(), "interface already exists; is another daemon running?");
			}
			return Err(e.into());
		}

		let settings = InterfaceConfig::default()
			.with_listen_port(self.config.wireguard.listen_port)
			.with_private_key(self.keypair.private_key().clone());
		if let Err(e) = handle.set(&settings) {
			if let Err(destroy_err) = handle.destroy() {
				warn!(error = %destroy_err, "failed to destroy interface after failed configuration");
			}
			return Err(e.into());
		}
		Ok(())
	}

	fn tear_down(&self) {
		match self.iface.write() {
			Ok(mut handle) => {
				if let Err(e) = handle.destroy() {
					warn!(error = %e, "failed to destroy interface");
				}
			}
			Err(e) => warn!(error = %e, "interface unavailable for teardown"),
		}
		self.peer_count.store(0, Ordering::Relaxed);
	}

	/// Destroys the interface and returns to Stopped. Does nothing unless Running.
	#[instrument(skip(self), fields(ifname = %self.iface.name()))]
	pub fn stop(&mut self) -> Result<()> {
		if self.state != DaemonState::Running {
			return Ok(());
		}
		if let Err(e) = self.iface.write().and_then(|mut handle| handle.destroy()) {
			self.state = DaemonState::Error;
			return Err(e.into());
		}
		self.peer_count.store(0, Ordering::Relaxed);
		self.state = DaemonState::Stopped;
		info!("daemon stopped");
		Ok(())
	}

	/// Releases everything the daemon holds. Failures are logged only.
	#[instrument(skip(self), fields(ifname = %self.iface.name()))]
	pub async fn cleanup(self) {
		let Daemon { iface, db, .. } = self;

		let mut handle = iface.into_inner();
		if handle.state() == IfaceState::Created {
			if let Err(e) = handle.destroy() {
				warn!(error = %e, "failed to destroy interface during cleanup");
			}
		}
		handle.close();
		db.close().await;
		info!("daemon cleaned up");
	}

	pub fn status(&self) -> DaemonState {
		self.state
	}

	pub fn config(&self) -> &FwConfig {
		&self.config
	}

	pub fn public_key(&self) -> &WgPublicKey {
		self.keypair.public_key()
	}

	/// Peers on the interface as of the last change the daemon made.
	pub fn peer_count(&self) -> usize {
		self.peer_count.load(Ordering::Relaxed)
	}

	pub fn last_reconcile(&self) -> Option<&ReconcileReport> {
		self.last_reconcile.as_ref()
	}

	fn require_running(&self) -> Result<()> {
		if self.state == DaemonState::Running {
			Ok(())
		} else {
			Err(FwError::Generic(format!("daemon is {}, not running", self.state)))
		}
	}

	/// Runs `f` under the interface write lock and refreshes the peer count.
	fn with_handle<T>(&self, f: impl FnOnce(&mut WgHandle) -> fwvpn_wg_iface::Result<T>) -> Result<T> {
		let mut handle = self.iface.write()?;
		let out = f(&mut handle)?;
		match handle.peer_count() {
			Ok(count) => self.peer_count.store(count, Ordering::Relaxed),
			Err(e) => warn!(error = %e, "failed to refresh peer count"),
		}
		Ok(out)
	}

	fn reconcile_with(&self, assignments: &[VpnAssignment]) -> Result<ReconcileReport> {
		let desired = reconcile::desired_peers(assignments, self.config.wireguard.keepalive_secs);
		self.with_handle(|handle| reconcile::reconcile(handle, desired))
	}

	/// Re-reads the stored assignments and brings the interface in line.
	#[instrument(skip(self))]
	pub async fn reconcile(&mut self) -> Result<&ReconcileReport> {
		self.require_running()?;
		let assignments = self.vpn.list_assignments().await?;
		let report = self.reconcile_with(&assignments)?;
		Ok(&*self.last_reconcile.insert(report))
	}

	/// Adds or updates a peer. The peer ends up with exactly `allowed_ips`.
	#[instrument(skip(self, allowed_ips), fields(peer = %public_key))]
	pub fn add_peer(&self, public_key: &str, allowed_ips: &[IpNet]) -> Result<PeerStatus> {
		self.require_running()?;
		let key = WgPublicKey::from_base64(public_key)?;
		if allowed_ips.is_empty() {
			return Err(FwError::generic("a peer needs at least one allowed ip"));
		}

		let peer = allowed_ips
			.iter()
			.fold(Peer::new(key), |peer, net| peer.with_allowed_ip(*net))
			.with_keepalive(self.config.wireguard.keepalive_secs)
			.replacing_allowed_ips();
		let added = self.with_handle(|handle| {
			handle.add_peer(&peer)?;
			handle.get_peer(&key)
		})?;
		Ok(PeerStatus::from_peer(&added, Utc::now()))
	}

	pub fn get_peer(&self, public_key: &str) -> Result<PeerStatus> {
		self.require_running()?;
		let key = WgPublicKey::from_base64(public_key)?;
		let peer = self.iface.read()?.get_peer(&key)?;
		Ok(PeerStatus::from_peer(&peer, Utc::now()))
	}

	/// Removes a peer. Keys the interface does not hold are not an error.
	#[instrument(skip(self), fields(peer = %public_key))]
	pub fn remove_peer(&self, public_key: &str) -> Result<()> {
		self.require_running()?;
		let key = WgPublicKey::from_base64(public_key)?;
		self.with_handle(|handle| handle.remove_peer(&key))
	}

	pub fn list_peers(&self) -> Result<Vec<PeerStatus>> {
		self.require_running()?;
		let peers = self.iface.read()?.list_peers()?;
		let now = Utc::now();
		Ok(peers.iter().map(|peer| PeerStatus::from_peer(peer, now)).collect())
	}

	pub fn stats(&self) -> Result<DaemonStats> {
		Ok(DaemonStats::collect(&self.list_peers()?))
	}

	/// Gives an account a tunnel address, a key pair and a live peer.
	///
	/// An account that already has an assignment gets it back unchanged. If
	/// the kernel rejects the peer the stored assignment is removed again.
	#[instrument(skip(self), fields(%account_id))]
	pub async fn provision_account(&self, account_id: &str) -> Result<VpnAssignment> {
		self.require_running()?;
		let _guard = self.provision_lock.lock().await;

		if let Some(existing) = self.vpn.get_assignment(account_id).await? {
			return Ok(existing);
		}
		if self.accounts.get_account(account_id).await?.is_none() {
			return Err(FwError::Auth(format!("unknown account {account_id}")));
		}

		let taken: HashSet<Ipv4Addr> = self
			.vpn
			.assigned_ips()
			.await?
			.iter()
			.filter_map(|ip| ip.parse().ok())
			.collect();
		let ip = self
			.allocator
			.next_available(&taken)
			.ok_or_else(|| FwError::generic("VPN address pool exhausted"))?;
		let allowed_ip = host_net(ip).map_err(FwError::Generic)?;
		let left = self.allocator.remaining(&taken).saturating_sub(1);
		if left * LOW_POOL_DIVISOR < self.allocator.capacity() {
			warn!(left, capacity = self.allocator.capacity(), "VPN address pool nearly exhausted");
		}

		let keypair = WgKeyPair::generate();
		let public_key = keypair.public_key().to_base64();
		let assignment = self
			.vpn
			.insert_assignment(account_id, &ip.to_string(), &keypair.private_key().to_base64(), &public_key)
			.await?;

		let peer = Peer::new(*keypair.public_key())
			.with_allowed_ip(allowed_ip)
			.with_keepalive(self.config.wireguard.keepalive_secs);
		if let Err(e) = self.with_handle(|handle| handle.add_peer(&peer)) {
			warn!(error = %e, "kernel rejected new peer; removing stored assignment");
			if let Err(db_err) = self.vpn.delete_assignment(account_id).await {
				error!(error = %db_err, "failed to remove orphaned VPN assignment");
			}
			return Err(e);
		}

		info!(%ip, %public_key, "account provisioned");
		Ok(assignment)
	}

	/// Removes an account's peer and assignment after checking that
	/// `public_key` is the one on record.
	#[instrument(skip(self), fields(%account_id))]
	pub async fn deprovision_account(&self, account_id: &str, public_key: &str) -> Result<()> {
		self.require_running()?;
		let _guard = self.provision_lock.lock().await;

		let assignment = self
			.vpn
			.get_assignment(account_id)
			.await?
			.ok_or_else(|| DbError::NotFound(format!("VPN assignment for {account_id}")))?;
		if assignment.public_key != public_key {
			return Err(FwError::Auth(format!(
				"public key does not match the assignment for {account_id}"
			)));
		}

		let key = WgPublicKey::from_base64(&assignment.public_key)?;
		self.with_handle(|handle| handle.remove_peer(&key))?;
		self.vpn.delete_assignment(account_id).await?;
		info!(ip = %assignment.assigned_ip, "account deprovisioned");
		Ok(())
	}
}

async fn load_server_key(config: &FwConfig) -> Result<WgKeyPair> {
	match &config.wireguard.key_file {
		Some(path) => Ok(get_or_create_key(path).await?),
		None => {
			warn!("no server key file configured; using a key that lasts only for this run");
			Ok(WgKeyPair::generate())
		}
	}
}
