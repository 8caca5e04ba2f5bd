// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-disk storage for the server's private key.
//!
//! The file holds the base64 private key followed by a newline and is created
//! with mode 0600 on unix.

use crate::keys::{KeyError, WgKeyPair, WgPrivateKey};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum KeyFileError {
	#[error("failed to access key file: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid key format: {0}")]
	InvalidFormat(#[from] KeyError),
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_key_file(path: impl AsRef<Path>) -> Result<WgKeyPair> {
	let content = zeroize::Zeroizing::new(fs::read_to_string(path.as_ref()).await?);
	let private = WgPrivateKey::from_base64(content.trim())?;
	Ok(WgKeyPair::from_private_key(private))
}

#[instrument(skip(key), fields(path = %path.as_ref().display()))]
pub async fn save_key_file(key: &WgKeyPair, path: impl AsRef<Path>) -> Result<()> {
	let path = path.as_ref();

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await?;
	}

	let private_b64 = key.private_key().to_base64();
	let content = zeroize::Zeroizing::new(format!("{}\n", private_b64.expose()));

	#[cfg(unix)]
	{
		use tokio::fs::OpenOptions;
		use tokio::io::AsyncWriteExt;

		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(0o600)
			.open(path)
			.await?;
		file.write_all(content.as_bytes()).await?;
	}

	#[cfg(not(unix))]
	{
		fs::write(path, content.as_bytes()).await?;
	}

	Ok(())
}

/// Loads the key at `path`, generating and saving a fresh one if it is missing.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn get_or_create_key(path: impl AsRef<Path>) -> Result<WgKeyPair> {
	let path = path.as_ref();

	if fs::try_exists(path).await? {
		return load_key_file(path).await;
	}

	let keypair = WgKeyPair::generate();
	save_key_file(&keypair, path).await?;
	info!(public_key = %keypair.public_key(), "generated server key");
	Ok(keypair)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn save_and_load_key() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg.key");

		let keypair = WgKeyPair::generate();
		save_key_file(&keypair, &key_path).await.unwrap();

		let loaded = load_key_file(&key_path).await.unwrap();
		assert_eq!(keypair.public_key(), loaded.public_key());
	}

	#[tokio::test]
	#[cfg(unix)]
	async fn save_key_sets_permissions() {
		use std::os::unix::fs::PermissionsExt;

		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg.key");

		save_key_file(&WgKeyPair::generate(), &key_path).await.unwrap();

		let mode = std::fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
		assert_eq!(mode, 0o600);
	}

	#[tokio::test]
	async fn get_or_create_reuses_existing_key() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("keys").join("wg.key");

		let first = get_or_create_key(&key_path).await.unwrap();
		assert!(key_path.exists());
		let second = get_or_create_key(&key_path).await.unwrap();

		assert_eq!(first.public_key(), second.public_key());
	}

	#[tokio::test]
	async fn load_rejects_garbage() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg.key");
		std::fs::write(&key_path, "definitely not a key\n").unwrap();

		let err = load_key_file(&key_path).await.unwrap_err();
		assert!(matches!(err, KeyFileError::InvalidFormat(_)));
	}

	#[tokio::test]
	async fn load_missing_file_is_io_error() {
		let temp_dir = TempDir::new().unwrap();
		let err = load_key_file(temp_dir.path().join("missing")).await.unwrap_err();
		assert!(matches!(err, KeyFileError::Io(_)));
	}
}
