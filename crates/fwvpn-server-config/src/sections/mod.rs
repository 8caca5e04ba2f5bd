// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod api;
mod database;
mod logging;
mod wireguard;

pub use api::{ApiConfig, ApiConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use wireguard::{DriverKind, WireguardConfig, WireguardConfigLayer};
