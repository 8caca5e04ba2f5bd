// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Byte layout of the wg(4) structural control message.
//!
//! A message is one `wg_interface_io` header followed by `peers` entries of
//! `wg_peer_io`, each immediately followed by its `wg_aip_io` allowed-ip
//! entries. Offsets match the LP64 C layout, including padding. Integers are
//! native-endian except ports, which travel in network order.
//!
//! [`MessageShape::size`] is the only place the buffer size is computed.

use crate::config::InterfaceConfig;
use crate::error::{Result, WgError};
use crate::peers::{Peer, PeerFlags};
use chrono::{DateTime, Utc};
use fwvpn_wg_keys::{WgPrivateKey, WgPublicKey, WG_KEY_LEN};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Interface name buffer size, including the terminating NUL.
pub const IFNAMSIZ: usize = 16;

/// Maximum number of peers one interface may hold.
pub const WG_PEERS_MAX: usize = 1024;

pub const INTERFACE_IO_SIZE: usize = 80;
pub const PEER_IO_SIZE: usize = 144;
pub const AIP_IO_SIZE: usize = 24;

pub const WG_INTERFACE_HAS_PUBLIC: u8 = 1 << 0;
pub const WG_INTERFACE_HAS_PRIVATE: u8 = 1 << 1;
pub const WG_INTERFACE_HAS_PORT: u8 = 1 << 2;
pub const WG_INTERFACE_HAS_RTABLE: u8 = 1 << 3;
pub const WG_INTERFACE_REPLACE_PEERS: u8 = 1 << 4;

pub const WG_PEER_HAS_PUBLIC: i32 = 1 << 0;
pub const WG_PEER_HAS_PSK: i32 = 1 << 1;
pub const WG_PEER_HAS_PKA: i32 = 1 << 2;
pub const WG_PEER_HAS_ENDPOINT: i32 = 1 << 3;
pub const WG_PEER_REPLACE_AIPS: i32 = 1 << 4;
pub const WG_PEER_REMOVE: i32 = 1 << 5;
pub const WG_PEER_UPDATE: i32 = 1 << 6;

// OpenBSD address family numbers.
const AF_INET: u8 = 2;
const AF_INET6: u8 = 24;

const SOCKADDR_IN_LEN: u8 = 16;
const SOCKADDR_IN6_LEN: u8 = 28;

// wg_interface_io
const I_FLAGS: usize = 0;
const I_PORT: usize = 2;
const I_RTABLE: usize = 4;
const I_PUBLIC: usize = 8;
const I_PRIVATE: usize = 40;
const I_PEERS_COUNT: usize = 72;

// wg_peer_io
const P_FLAGS: usize = 0;
const P_PROTOCOL_VERSION: usize = 4;
const P_PUBLIC: usize = 8;
const P_PKA: usize = 72;
const P_ENDPOINT: usize = 76;
const P_TXBYTES: usize = 104;
const P_RXBYTES: usize = 112;
const P_LAST_HANDSHAKE: usize = 120;
const P_AIPS_COUNT: usize = 136;

// wg_aip_io
const A_AF: usize = 0;
const A_CIDR: usize = 4;
const A_ADDR: usize = 8;

/// Shape of a structural message: header only, or header plus peer entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageShape {
	Interface,
	WithPeers { peers: usize, aips: usize },
}

impl MessageShape {
	/// Shape for `peers` entries carrying `aips` allowed-ip entries in total.
	pub fn with_peers(peers: usize, aips: usize) -> Result<Self> {
		if peers > WG_PEERS_MAX {
			return Err(WgError::Capacity { max: WG_PEERS_MAX });
		}
		match (peers, aips) {
			(0, 0) => Ok(Self::Interface),
			(0, _) => Err(WgError::InvalidArgument(
				"allowed ips without a peer".to_string(),
			)),
			(peers, aips) => Ok(Self::WithPeers { peers, aips }),
		}
	}

	pub fn of(config: &InterfaceConfig) -> Result<Self> {
		let aips = config.peers.iter().map(|p| p.allowed_ips.len()).sum();
		Self::with_peers(config.peers.len(), aips)
	}

	pub const fn size(&self) -> usize {
		match *self {
			Self::Interface => INTERFACE_IO_SIZE,
			Self::WithPeers { peers, aips } => {
				INTERFACE_IO_SIZE + peers * PEER_IO_SIZE + aips * AIP_IO_SIZE
			}
		}
	}

	pub const fn peers(&self) -> usize {
		match *self {
			Self::Interface => 0,
			Self::WithPeers { peers, .. } => peers,
		}
	}
}

/// Serializes `config` into a buffer of exactly `MessageShape::of(config).size()` bytes.
pub fn encode(config: &InterfaceConfig) -> Result<Vec<u8>> {
	let shape = MessageShape::of(config)?;
	let mut buf = vec![0u8; shape.size()];

	let mut flags = 0u8;
	if let Some(key) = &config.public_key {
		flags |= WG_INTERFACE_HAS_PUBLIC;
		buf[I_PUBLIC..I_PUBLIC + WG_KEY_LEN].copy_from_slice(key.as_bytes());
	}
	if let Some(key) = &config.private_key {
		flags |= WG_INTERFACE_HAS_PRIVATE;
		buf[I_PRIVATE..I_PRIVATE + WG_KEY_LEN].copy_from_slice(key.expose_bytes());
	}
	if let Some(port) = config.listen_port {
		flags |= WG_INTERFACE_HAS_PORT;
		buf[I_PORT..I_PORT + 2].copy_from_slice(&port.to_be_bytes());
	}
	if let Some(rtable) = config.rtable {
		flags |= WG_INTERFACE_HAS_RTABLE;
		put_i32(&mut buf, I_RTABLE, rtable);
	}
	if config.replace_peers {
		flags |= WG_INTERFACE_REPLACE_PEERS;
	}
	buf[I_FLAGS] = flags;
	put_u64(&mut buf, I_PEERS_COUNT, config.peers.len() as u64);

	let mut offset = INTERFACE_IO_SIZE;
	for peer in &config.peers {
		offset = encode_peer(&mut buf, offset, peer);
	}
	debug_assert_eq!(offset, buf.len());

	Ok(buf)
}

fn encode_peer(buf: &mut [u8], base: usize, peer: &Peer) -> usize {
	let mut flags = WG_PEER_HAS_PUBLIC;
	if peer.persistent_keepalive.is_some() {
		flags |= WG_PEER_HAS_PKA;
	}
	if peer.endpoint.is_some() {
		flags |= WG_PEER_HAS_ENDPOINT;
	}
	if peer.flags.replace_allowed_ips {
		flags |= WG_PEER_REPLACE_AIPS;
	}
	if peer.flags.remove {
		flags |= WG_PEER_REMOVE;
	}
	if peer.flags.update_only {
		flags |= WG_PEER_UPDATE;
	}

	put_i32(buf, base + P_FLAGS, flags);
	put_i32(buf, base + P_PROTOCOL_VERSION, peer.protocol_version);
	buf[base + P_PUBLIC..base + P_PUBLIC + WG_KEY_LEN].copy_from_slice(peer.public_key.as_bytes());
	if let Some(pka) = peer.persistent_keepalive {
		put_u16(buf, base + P_PKA, pka);
	}
	if let Some(endpoint) = peer.endpoint {
		encode_sockaddr(&mut buf[base + P_ENDPOINT..base + P_TXBYTES], endpoint);
	}
	put_u64(buf, base + P_TXBYTES, peer.tx_bytes);
	put_u64(buf, base + P_RXBYTES, peer.rx_bytes);
	if let Some(at) = peer.last_handshake {
		put_i64(buf, base + P_LAST_HANDSHAKE, at.timestamp());
		put_i64(
			buf,
			base + P_LAST_HANDSHAKE + 8,
			i64::from(at.timestamp_subsec_nanos()),
		);
	}
	put_u64(buf, base + P_AIPS_COUNT, peer.allowed_ips.len() as u64);

	let mut offset = base + PEER_IO_SIZE;
	for net in &peer.allowed_ips {
		encode_aip(&mut buf[offset..offset + AIP_IO_SIZE], net);
		offset += AIP_IO_SIZE;
	}
	offset
}

fn encode_sockaddr(out: &mut [u8], addr: SocketAddr) {
	match addr {
		SocketAddr::V4(v4) => {
			out[0] = SOCKADDR_IN_LEN;
			out[1] = AF_INET;
			out[2..4].copy_from_slice(&v4.port().to_be_bytes());
			out[4..8].copy_from_slice(&v4.ip().octets());
		}
		SocketAddr::V6(v6) => {
			out[0] = SOCKADDR_IN6_LEN;
			out[1] = AF_INET6;
			out[2..4].copy_from_slice(&v6.port().to_be_bytes());
			out[4..8].copy_from_slice(&v6.flowinfo().to_be_bytes());
			out[8..24].copy_from_slice(&v6.ip().octets());
			out[24..28].copy_from_slice(&v6.scope_id().to_ne_bytes());
		}
	}
}

fn encode_aip(out: &mut [u8], net: &IpNet) {
	match net {
		IpNet::V4(v4) => {
			out[A_AF] = AF_INET;
			out[A_CIDR..A_CIDR + 4].copy_from_slice(&i32::from(v4.prefix_len()).to_ne_bytes());
			out[A_ADDR..A_ADDR + 4].copy_from_slice(&v4.addr().octets());
		}
		IpNet::V6(v6) => {
			out[A_AF] = AF_INET6;
			out[A_CIDR..A_CIDR + 4].copy_from_slice(&i32::from(v6.prefix_len()).to_ne_bytes());
			out[A_ADDR..A_ADDR + 16].copy_from_slice(&v6.addr().octets());
		}
	}
}

/// Parses a message. `buf` must be exactly the size the driver reported.
pub fn decode(buf: &[u8]) -> Result<InterfaceConfig> {
	if buf.len() < INTERFACE_IO_SIZE {
		return Err(WgError::Malformed(format!(
			"message of {} bytes is shorter than the {INTERFACE_IO_SIZE} byte header",
			buf.len()
		)));
	}

	let flags = buf[I_FLAGS];
	let mut config = InterfaceConfig::default();
	if flags & WG_INTERFACE_HAS_PUBLIC != 0 {
		config.public_key = Some(WgPublicKey::from_bytes(key_at(buf, I_PUBLIC)));
	}
	if flags & WG_INTERFACE_HAS_PRIVATE != 0 {
		config.private_key = Some(WgPrivateKey::from_bytes(key_at(buf, I_PRIVATE)));
	}
	if flags & WG_INTERFACE_HAS_PORT != 0 {
		config.listen_port = Some(u16::from_be_bytes([buf[I_PORT], buf[I_PORT + 1]]));
	}
	if flags & WG_INTERFACE_HAS_RTABLE != 0 {
		config.rtable = Some(get_i32(buf, I_RTABLE));
	}
	config.replace_peers = flags & WG_INTERFACE_REPLACE_PEERS != 0;

	let count = get_u64(buf, I_PEERS_COUNT) as usize;
	let mut offset = INTERFACE_IO_SIZE;
	let mut peers = Vec::with_capacity(count.min(WG_PEERS_MAX));
	for index in 0..count {
		let (peer, next) = decode_peer(buf, offset)
			.map_err(|e| WgError::Malformed(format!("peer {index}: {e}")))?;
		peers.push(peer);
		offset = next;
	}
	config.peers = peers;

	if offset != buf.len() {
		return Err(WgError::Malformed(format!(
			"{} trailing bytes after {count} peers",
			buf.len() - offset
		)));
	}

	Ok(config)
}

fn decode_peer(buf: &[u8], base: usize) -> std::result::Result<(Peer, usize), String> {
	if buf.len() < base + PEER_IO_SIZE {
		return Err("entry truncated".to_string());
	}

	let flags = get_i32(buf, base + P_FLAGS);
	let aips_count = get_u64(buf, base + P_AIPS_COUNT) as usize;
	let aips_end = aips_count
		.checked_mul(AIP_IO_SIZE)
		.and_then(|len| len.checked_add(base + PEER_IO_SIZE))
		.filter(|end| *end <= buf.len())
		.ok_or_else(|| format!("{aips_count} allowed ips do not fit"))?;

	let mut allowed_ips = Vec::with_capacity(aips_count);
	let mut offset = base + PEER_IO_SIZE;
	while offset < aips_end {
		allowed_ips.push(decode_aip(&buf[offset..offset + AIP_IO_SIZE])?);
		offset += AIP_IO_SIZE;
	}

	let endpoint = if flags & WG_PEER_HAS_ENDPOINT != 0 {
		decode_sockaddr(&buf[base + P_ENDPOINT..base + P_TXBYTES])
	} else {
		None
	};

	let persistent_keepalive = if flags & WG_PEER_HAS_PKA != 0 {
		Some(get_u16(buf, base + P_PKA))
	} else {
		None
	};

	let secs = get_i64(buf, base + P_LAST_HANDSHAKE);
	let nanos = get_i64(buf, base + P_LAST_HANDSHAKE + 8);
	let last_handshake = handshake_time(secs, nanos);

	let peer = Peer {
		public_key: WgPublicKey::from_bytes(key_at(buf, base + P_PUBLIC)),
		allowed_ips,
		endpoint,
		persistent_keepalive,
		flags: PeerFlags {
			remove: flags & WG_PEER_REMOVE != 0,
			replace_allowed_ips: flags & WG_PEER_REPLACE_AIPS != 0,
			update_only: flags & WG_PEER_UPDATE != 0,
		},
		protocol_version: get_i32(buf, base + P_PROTOCOL_VERSION),
		last_handshake,
		rx_bytes: get_u64(buf, base + P_RXBYTES),
		tx_bytes: get_u64(buf, base + P_TXBYTES),
	};

	Ok((peer, aips_end))
}

fn handshake_time(secs: i64, nanos: i64) -> Option<DateTime<Utc>> {
	if secs == 0 && nanos == 0 {
		return None;
	}
	let nanos = u32::try_from(nanos).ok()?;
	DateTime::from_timestamp(secs, nanos)
}

fn decode_sockaddr(raw: &[u8]) -> Option<SocketAddr> {
	let port = u16::from_be_bytes([raw[2], raw[3]]);
	match raw[1] {
		AF_INET => {
			let ip = Ipv4Addr::new(raw[4], raw[5], raw[6], raw[7]);
			Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
		}
		AF_INET6 => {
			let flowinfo = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
			let mut octets = [0u8; 16];
			octets.copy_from_slice(&raw[8..24]);
			let scope_id = u32::from_ne_bytes([raw[24], raw[25], raw[26], raw[27]]);
			Some(SocketAddr::V6(SocketAddrV6::new(
				Ipv6Addr::from(octets),
				port,
				flowinfo,
				scope_id,
			)))
		}
		_ => None,
	}
}

fn decode_aip(raw: &[u8]) -> std::result::Result<IpNet, String> {
	let cidr = i32::from_ne_bytes([raw[A_CIDR], raw[A_CIDR + 1], raw[A_CIDR + 2], raw[A_CIDR + 3]]);
	let prefix = u8::try_from(cidr).map_err(|_| format!("invalid prefix length {cidr}"))?;
	match raw[A_AF] {
		AF_INET => {
			let addr = Ipv4Addr::new(raw[A_ADDR], raw[A_ADDR + 1], raw[A_ADDR + 2], raw[A_ADDR + 3]);
			Ipv4Net::new(addr, prefix)
				.map(IpNet::V4)
				.map_err(|e| e.to_string())
		}
		AF_INET6 => {
			let mut octets = [0u8; 16];
			octets.copy_from_slice(&raw[A_ADDR..A_ADDR + 16]);
			Ipv6Net::new(Ipv6Addr::from(octets), prefix)
				.map(IpNet::V6)
				.map_err(|e| e.to_string())
		}
		af => Err(format!("unknown address family {af}")),
	}
}

/// Public key of the first seeded peer entry of a request, if any.
///
/// A `get` request may carry one peer entry naming the key the caller is
/// interested in. Drivers that honour the seed answer with that peer only.
pub fn seeded_peer_key(buf: &[u8]) -> Option<WgPublicKey> {
	if buf.len() < INTERFACE_IO_SIZE + PEER_IO_SIZE || get_u64(buf, I_PEERS_COUNT) == 0 {
		return None;
	}
	let base = INTERFACE_IO_SIZE;
	if get_i32(buf, base + P_FLAGS) & WG_PEER_HAS_PUBLIC == 0 {
		return None;
	}
	Some(WgPublicKey::from_bytes(key_at(buf, base + P_PUBLIC)))
}

fn key_at(buf: &[u8], offset: usize) -> [u8; WG_KEY_LEN] {
	let mut key = [0u8; WG_KEY_LEN];
	key.copy_from_slice(&buf[offset..offset + WG_KEY_LEN]);
	key
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
	buf[offset..offset + 2].copy_from_slice(&value.to_ne_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
	buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
	buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
}

fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
	buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
}

fn get_u16(buf: &[u8], offset: usize) -> u16 {
	u16::from_ne_bytes([buf[offset], buf[offset + 1]])
}

fn get_i32(buf: &[u8], offset: usize) -> i32 {
	let mut raw = [0u8; 4];
	raw.copy_from_slice(&buf[offset..offset + 4]);
	i32::from_ne_bytes(raw)
}

fn get_u64(buf: &[u8], offset: usize) -> u64 {
	let mut raw = [0u8; 8];
	raw.copy_from_slice(&buf[offset..offset + 8]);
	u64::from_ne_bytes(raw)
}

fn get_i64(buf: &[u8], offset: usize) -> i64 {
	let mut raw = [0u8; 8];
	raw.copy_from_slice(&buf[offset..offset + 8]);
	i64::from_ne_bytes(raw)
}
