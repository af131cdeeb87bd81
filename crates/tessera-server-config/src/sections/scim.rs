// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SCIM protocol surface configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_PATH: &str = "/scim/v2";
pub const DEFAULT_MAX_BULK_OPERATIONS: usize = 1000;
pub const DEFAULT_MAX_BULK_PAYLOAD_BYTES: usize = 1_048_576;
pub const DEFAULT_MAX_RESULTS: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 50;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Which organization backend the protocol engine provisions into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScimBackend {
	#[default]
	App,
	Organization,
}

impl fmt::Display for ScimBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScimBackend::App => f.write_str("app"),
			ScimBackend::Organization => f.write_str("organization"),
		}
	}
}

impl FromStr for ScimBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"app" => Ok(ScimBackend::App),
			"organization" | "org" => Ok(ScimBackend::Organization),
			other => Err(format!("unknown backend '{other}' (expected app or organization)")),
		}
	}
}

/// Default DELETE behaviour for tenants without explicit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScimDeleteMode {
	#[default]
	Soft,
	Hard,
}

impl FromStr for ScimDeleteMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"soft" => Ok(ScimDeleteMode::Soft),
			"hard" => Ok(ScimDeleteMode::Hard),
			other => Err(format!("unknown delete mode '{other}' (expected soft or hard)")),
		}
	}
}

/// SCIM configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct ScimConfig {
	pub enabled: bool,
	pub base_path: String,
	pub max_bulk_operations: usize,
	pub max_bulk_payload_bytes: usize,
	pub max_results: usize,
	pub default_page_size: usize,
	pub rate_limit_per_second: u32,
	pub rate_limit_burst: u32,
	pub backend: ScimBackend,
	pub delete_mode: ScimDeleteMode,
	/// Deadline for a single request. Zero disables it.
	pub request_timeout_secs: u64,
}

impl Default for ScimConfig {
	fn default() -> Self {
		ScimConfigLayer::default().finalize()
	}
}

/// SCIM configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScimConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub base_path: Option<String>,
	#[serde(default)]
	pub max_bulk_operations: Option<usize>,
	#[serde(default)]
	pub max_bulk_payload_bytes: Option<usize>,
	#[serde(default)]
	pub max_results: Option<usize>,
	#[serde(default)]
	pub default_page_size: Option<usize>,
	#[serde(default)]
	pub rate_limit_per_second: Option<u32>,
	#[serde(default)]
	pub rate_limit_burst: Option<u32>,
	#[serde(default)]
	pub backend: Option<ScimBackend>,
	#[serde(default)]
	pub delete_mode: Option<ScimDeleteMode>,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
}

impl ScimConfigLayer {
	pub fn merge(&mut self, other: ScimConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.base_path.is_some() {
			self.base_path = other.base_path;
		}
		if other.max_bulk_operations.is_some() {
			self.max_bulk_operations = other.max_bulk_operations;
		}
		if other.max_bulk_payload_bytes.is_some() {
			self.max_bulk_payload_bytes = other.max_bulk_payload_bytes;
		}
		if other.max_results.is_some() {
			self.max_results = other.max_results;
		}
		if other.default_page_size.is_some() {
			self.default_page_size = other.default_page_size;
		}
		if other.rate_limit_per_second.is_some() {
			self.rate_limit_per_second = other.rate_limit_per_second;
		}
		if other.rate_limit_burst.is_some() {
			self.rate_limit_burst = other.rate_limit_burst;
		}
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.delete_mode.is_some() {
			self.delete_mode = other.delete_mode;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
	}

	pub fn finalize(self) -> ScimConfig {
		let base_path = self
			.base_path
			.map(|p| format!("/{}", p.trim_matches('/')))
			.unwrap_or_else(|| DEFAULT_BASE_PATH.to_string());

		ScimConfig {
			enabled: self.enabled.unwrap_or(true),
			base_path,
			max_bulk_operations: self
				.max_bulk_operations
				.unwrap_or(DEFAULT_MAX_BULK_OPERATIONS),
			max_bulk_payload_bytes: self
				.max_bulk_payload_bytes
				.unwrap_or(DEFAULT_MAX_BULK_PAYLOAD_BYTES),
			max_results: self.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
			default_page_size: self.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
			rate_limit_per_second: self
				.rate_limit_per_second
				.unwrap_or(DEFAULT_RATE_LIMIT_PER_SECOND),
			rate_limit_burst: self.rate_limit_burst.unwrap_or(DEFAULT_RATE_LIMIT_BURST),
			backend: self.backend.unwrap_or_default(),
			delete_mode: self.delete_mode.unwrap_or_default(),
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
		}
	}
}
