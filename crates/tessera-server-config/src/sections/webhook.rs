// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Outbound provisioning webhook.

use serde::{Deserialize, Serialize};
use tessera_server_auth::SecretString;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfigLayer {
	pub url: Option<String>,
	pub timeout_secs: Option<u64>,
}

impl WebhookConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
	}

	/// Returns `None` when no URL is configured. The signing secret comes
	/// from `TESSERA_WEBHOOK_SECRET` (or `TESSERA_WEBHOOK_SECRET_FILE`) only.
	pub fn finalize(self, secret: Option<SecretString>) -> Option<WebhookConfig> {
		let url = self.url.filter(|u| !u.is_empty())?;
		Some(WebhookConfig {
			url,
			secret,
			timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
		})
	}
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
	pub url: String,
	pub secret: Option<SecretString>,
	pub timeout_secs: u64,
}
