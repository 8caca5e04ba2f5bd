// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard keys for fwvpnd.
//!
//! - [`WgPublicKey`], [`WgPrivateKey`] and [`WgKeyPair`]: typed 32-byte keys
//! - [`encode_key`] / [`decode_key`]: the canonical 44-character base64 form
//! - [`keys_file`]: loading and saving the server key

pub mod keys;
pub mod keys_file;

pub use keys::{
	decode_key, encode_key, encode_key_to_slice, KeyError, WgKeyPair, WgPrivateKey, WgPublicKey,
	WG_KEY_B64_LEN, WG_KEY_LEN,
};
pub use keys_file::{get_or_create_key, load_key_file, save_key_file, KeyFileError};
