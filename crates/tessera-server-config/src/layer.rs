// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	AuditConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, ScimConfigLayer,
	WebhookConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub scim: Option<ScimConfigLayer>,
	#[serde(default)]
	pub audit: Option<AuditConfigLayer>,
	#[serde(default)]
	pub webhook: Option<WebhookConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(&mut self.scim, other.scim, ScimConfigLayer::merge);
		merge_option(&mut self.audit, other.audit, AuditConfigLayer::merge);
		merge_option(&mut self.webhook, other.webhook, WebhookConfigLayer::merge);
	}
}

fn merge_option<T>(target: &mut Option<T>, other: Option<T>, merge_fn: fn(&mut T, T)) {
	match (target.as_mut(), other) {
		(Some(t), Some(o)) => merge_fn(t, o),
		(None, Some(o)) => *target = Some(o),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9000),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(base.http.and_then(|h| h.port), Some(9000));
	}

	#[test]
	fn test_merge_combines_fields_within_section() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
			[scim]
			max_results = 50
			"#,
		)
		.unwrap();
		let overlay: ServerConfigLayer = toml::from_str(
			r#"
			[scim]
			default_page_size = 10
			"#,
		)
		.unwrap();
		base.merge(overlay);

		let scim = base.scim.unwrap().finalize();
		assert_eq!(scim.max_results, 50);
		assert_eq!(scim.default_page_size, 10);
	}
}
