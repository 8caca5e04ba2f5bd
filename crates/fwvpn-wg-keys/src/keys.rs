// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard keys and their canonical text form.
//!
//! A key is exactly [`WG_KEY_LEN`] raw bytes. Wherever a key crosses a text
//! boundary (storage, configuration, logs) it is written as standard padded
//! base64, which is always [`WG_KEY_B64_LEN`] characters for a 32-byte key.
//! Decoding is strict: wrong length, foreign characters, bad padding and
//! non-canonical trailing bits are all rejected, so every key has exactly one
//! text form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fwvpn_common_secret::{Secret, SecretString};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Raw key length in bytes.
pub const WG_KEY_LEN: usize = 32;

/// Length of the base64 text form of a key.
pub const WG_KEY_B64_LEN: usize = 44;

#[derive(Debug, Error)]
pub enum KeyError {
	#[error("invalid base64 key: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("invalid key length: expected {expected} bytes, got {actual}")]
	Length { expected: usize, actual: usize },

	#[error("key buffer too small: need {needed} bytes, have {available}")]
	BufferTooSmall { needed: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, KeyError>;

/// Encodes a raw key into its base64 text form.
pub fn encode_key(key: &[u8; WG_KEY_LEN]) -> String {
	STANDARD.encode(key)
}

/// Encodes a raw key into `out`, returning the number of bytes written.
///
/// Fails without touching `out` when it is shorter than [`WG_KEY_B64_LEN`].
pub fn encode_key_to_slice(key: &[u8; WG_KEY_LEN], out: &mut [u8]) -> Result<usize> {
	if out.len() < WG_KEY_B64_LEN {
		return Err(KeyError::BufferTooSmall {
			needed: WG_KEY_B64_LEN,
			available: out.len(),
		});
	}

	STANDARD
		.encode_slice(key, out)
		.map_err(|_| KeyError::BufferTooSmall {
			needed: WG_KEY_B64_LEN,
			available: out.len(),
		})
}

/// Decodes the base64 text form of a key.
pub fn decode_key(text: &str) -> Result<[u8; WG_KEY_LEN]> {
	let bytes = Zeroizing::new(STANDARD.decode(text)?);
	if bytes.len() != WG_KEY_LEN {
		return Err(KeyError::Length {
			expected: WG_KEY_LEN,
			actual: bytes.len(),
		});
	}

	let mut key = [0u8; WG_KEY_LEN];
	key.copy_from_slice(&bytes);
	Ok(key)
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WgPublicKey([u8; WG_KEY_LEN]);

impl WgPublicKey {
	pub const fn from_bytes(bytes: [u8; WG_KEY_LEN]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; WG_KEY_LEN] {
		&self.0
	}

	pub fn from_base64(text: &str) -> Result<Self> {
		decode_key(text).map(Self)
	}

	pub fn to_base64(&self) -> String {
		encode_key(&self.0)
	}
}

impl From<[u8; WG_KEY_LEN]> for WgPublicKey {
	fn from(bytes: [u8; WG_KEY_LEN]) -> Self {
		Self(bytes)
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WgPublicKey({})", self.to_base64())
	}
}

impl FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_base64(s)
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let text = String::deserialize(deserializer)?;
		Self::from_base64(&text).map_err(serde::de::Error::custom)
	}
}

/// A private key. Never printed, zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct WgPrivateKey(Secret<[u8; WG_KEY_LEN]>);

impl WgPrivateKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		Self(Secret::new(secret.to_bytes()))
	}

	pub fn from_bytes(bytes: [u8; WG_KEY_LEN]) -> Self {
		Self(Secret::new(bytes))
	}

	pub fn from_base64(text: &str) -> Result<Self> {
		decode_key(text).map(Self::from_bytes)
	}

	pub fn to_base64(&self) -> SecretString {
		SecretString::new(encode_key(self.0.expose()))
	}

	pub fn expose_bytes(&self) -> &[u8; WG_KEY_LEN] {
		self.0.expose()
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(*self.0.expose());
		WgPublicKey(PublicKey::from(&secret).to_bytes())
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WgPrivateKey({:?})", self.0)
	}
}

#[derive(Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	/// Generates an independent key pair from the OS random source.
	pub fn generate() -> Self {
		Self::from_private_key(WgPrivateKey::generate())
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}
}

impl fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("public", &self.public)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn encoded_key_is_44_chars() {
		let encoded = encode_key(&[0u8; WG_KEY_LEN]);
		assert_eq!(encoded.len(), WG_KEY_B64_LEN);
		assert_eq!(encoded, "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
	}

	#[test]
	fn encode_to_slice_rejects_short_buffer() {
		let mut buf = [0u8; WG_KEY_B64_LEN - 1];
		let err = encode_key_to_slice(&[1u8; WG_KEY_LEN], &mut buf).unwrap_err();
		assert!(matches!(
			err,
			KeyError::BufferTooSmall {
				needed: 44,
				available: 43
			}
		));
		assert_eq!(buf, [0u8; WG_KEY_B64_LEN - 1]);
	}

	#[test]
	fn encode_to_slice_accepts_exact_and_larger_buffers() {
		let key = [9u8; WG_KEY_LEN];
		let mut exact = [0u8; WG_KEY_B64_LEN];
		assert_eq!(encode_key_to_slice(&key, &mut exact).unwrap(), WG_KEY_B64_LEN);

		let mut larger = [0u8; WG_KEY_B64_LEN + 1];
		assert_eq!(encode_key_to_slice(&key, &mut larger).unwrap(), WG_KEY_B64_LEN);
		assert_eq!(&larger[..WG_KEY_B64_LEN], &exact[..]);
		assert_eq!(std::str::from_utf8(&exact).unwrap(), encode_key(&key));
	}

	#[test]
	fn decode_rejects_short_key() {
		let short = STANDARD.encode([1u8; 31]);
		assert!(matches!(
			decode_key(&short),
			Err(KeyError::Length {
				expected: 32,
				actual: 31
			})
		));
	}

	#[test]
	fn decode_rejects_long_key() {
		let long = STANDARD.encode([1u8; 33]);
		assert!(matches!(
			decode_key(&long),
			Err(KeyError::Length {
				expected: 32,
				actual: 33
			})
		));
	}

	#[test]
	fn decode_rejects_out_of_alphabet() {
		let mut text = encode_key(&[3u8; WG_KEY_LEN]);
		text.replace_range(0..1, "*");
		assert!(matches!(decode_key(&text), Err(KeyError::Base64(_))));
	}

	#[test]
	fn decode_rejects_missing_padding() {
		let text = encode_key(&[3u8; WG_KEY_LEN]);
		let unpadded = text.trim_end_matches('=');
		assert!(decode_key(unpadded).is_err());
	}

	#[test]
	fn decode_rejects_non_canonical_trailing_bits() {
		// "AAA...AB=" sets bits that fall outside the 32 decoded bytes.
		let text = format!("{}B=", "A".repeat(42));
		assert!(decode_key(&text).is_err());
	}

	#[test]
	fn decode_rejects_empty() {
		assert!(matches!(
			decode_key(""),
			Err(KeyError::Length {
				expected: 32,
				actual: 0
			})
		));
	}

	#[test]
	fn private_key_debug_is_redacted() {
		let key = WgPrivateKey::from_bytes([42u8; WG_KEY_LEN]);
		let rendered = format!("{key:?}");
		assert!(!rendered.contains(&encode_key(&[42u8; WG_KEY_LEN])));
		assert!(rendered.contains("REDACTED"));
	}

	#[test]
	fn keypair_public_matches_private() {
		let pair = WgKeyPair::generate();
		assert_eq!(pair.private_key().public_key(), *pair.public_key());
	}

	#[test]
	fn generated_keypairs_are_independent() {
		let a = WgKeyPair::generate();
		let b = WgKeyPair::generate();
		assert_ne!(a.public_key(), b.public_key());
		assert_ne!(a.private_key(), b.private_key());
	}

	#[test]
	fn public_key_serde_uses_base64() {
		let key = WgPublicKey::from_bytes([5u8; WG_KEY_LEN]);
		let json = serde_json::to_string(&key).unwrap();
		assert_eq!(json, format!("\"{}\"", key.to_base64()));
		let back: WgPublicKey = serde_json::from_str(&json).unwrap();
		assert_eq!(back, key);
	}

	#[test]
	fn public_key_serde_rejects_bad_key() {
		let result: std::result::Result<WgPublicKey, _> = serde_json::from_str("\"not-a-key\"");
		assert!(result.is_err());
	}

	proptest! {
		#[test]
		fn decode_inverts_encode(bytes in proptest::array::uniform32(any::<u8>())) {
			prop_assert_eq!(decode_key(&encode_key(&bytes)).unwrap(), bytes);
		}

		#[test]
		fn encoding_is_fixed_length(bytes in proptest::array::uniform32(any::<u8>())) {
			prop_assert_eq!(encode_key(&bytes).len(), WG_KEY_B64_LEN);
		}

		#[test]
		fn decode_rejects_wrong_lengths(len in 0usize..64) {
			prop_assume!(len != WG_KEY_LEN);
			let text = STANDARD.encode(vec![0xA5u8; len]);
			let is_length_error = matches!(decode_key(&text), Err(KeyError::Length { .. }));
			prop_assert!(is_length_error);
		}

		#[test]
		fn private_key_text_round_trips(bytes in proptest::array::uniform32(any::<u8>())) {
			let key = WgPrivateKey::from_bytes(bytes);
			let text = key.to_base64();
			let back = WgPrivateKey::from_base64(text.expose()).unwrap();
			prop_assert_eq!(back.expose_bytes(), &bytes);
		}
	}
}
