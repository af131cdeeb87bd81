// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit pipeline configuration section.

use serde::{Deserialize, Serialize};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditConfigLayer {
	pub queue_capacity: Option<usize>,
	pub log_to_tracing: Option<bool>,
}

impl AuditConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
		if other.log_to_tracing.is_some() {
			self.log_to_tracing = other.log_to_tracing;
		}
	}

	pub fn finalize(self) -> AuditConfig {
		AuditConfig {
			queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
			log_to_tracing: self.log_to_tracing.unwrap_or(true),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditConfig {
	pub queue_capacity: usize,
	/// Mirror audit entries to the `audit` tracing target.
	pub log_to_tracing: bool,
}

impl Default for AuditConfig {
	fn default() -> Self {
		AuditConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = AuditConfig::default();
		assert_eq!(config.queue_capacity, 1024);
		assert!(config.log_to_tracing);
	}

	#[test]
	fn test_toml_parse() {
		let layer: AuditConfigLayer = toml::from_str("queue_capacity = 16").unwrap();
		assert_eq!(layer.finalize().queue_capacity, 16);
	}
}
