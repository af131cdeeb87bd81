// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Post-commit side effects: audit entries and webhook notifications.
//!
//! Both are dispatched only after the primary mutation has succeeded and
//! neither can fail the operation that triggered it. Failures are logged and
//! counted under `side_effect_failures_total`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tessera_server_audit::{AuditLogEntry, AuditService};
use tessera_server_auth::{SecretString, TenantId};
use tracing::{debug, warn};

use crate::metrics::ProvisioningMetrics;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Tessera-Signature";
pub const EVENT_HEADER: &str = "X-Tessera-Event";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
	#[error("request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("endpoint returned {0}")]
	Status(u16),

	#[error("serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisioningEvent {
	pub event: String,
	pub tenant_id: TenantId,
	pub resource_type: String,
	pub resource_id: String,
	pub occurred_at: DateTime<Utc>,
	pub data: serde_json::Value,
}

impl ProvisioningEvent {
	pub fn new(
		event: impl Into<String>,
		tenant_id: TenantId,
		resource_type: impl Into<String>,
		resource_id: impl Into<String>,
		data: serde_json::Value,
	) -> Self {
		Self {
			event: event.into(),
			tenant_id,
			resource_type: resource_type.into(),
			resource_id: resource_id.into(),
			occurred_at: Utc::now(),
			data,
		}
	}
}

#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
	async fn dispatch(&self, event: &ProvisioningEvent) -> Result<(), WebhookError>;
}

pub struct NoopWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for NoopWebhookDispatcher {
	async fn dispatch(&self, event: &ProvisioningEvent) -> Result<(), WebhookError> {
		debug!(event = %event.event, "webhook delivery disabled");
		Ok(())
	}
}

/// Delivers events as signed JSON POSTs. Retries are the receiver's concern.
pub struct HttpWebhookDispatcher {
	client: reqwest::Client,
	url: String,
	secret: Option<SecretString>,
}

impl HttpWebhookDispatcher {
	pub fn new(url: impl Into<String>, secret: Option<SecretString>, timeout: Duration) -> Result<Self, WebhookError> {
		let client = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self {
			client,
			url: url.into(),
			secret,
		})
	}
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
	async fn dispatch(&self, event: &ProvisioningEvent) -> Result<(), WebhookError> {
		let body = serde_json::to_vec(event)?;
		let mut request = self
			.client
			.post(&self.url)
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.header(EVENT_HEADER, &event.event);
		if let Some(secret) = &self.secret {
			let signature = sign_payload(secret.expose().as_bytes(), &body);
			request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
		}

		let response = request.body(body).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(WebhookError::Status(status.as_u16()));
		}
		Ok(())
	}
}

/// Hex HMAC-SHA256 of `payload`.
pub fn sign_payload(secret: &[u8], payload: &[u8]) -> String {
	let mut mac = match HmacSha256::new_from_slice(secret) {
		Ok(mac) => mac,
		// HMAC accepts keys of any length.
		Err(_) => return String::new(),
	};
	mac.update(payload);
	hex::encode(mac.finalize().into_bytes())
}

/// Checks a `sha256=<hex>` header value against `payload`.
pub fn verify_signature(secret: &[u8], payload: &[u8], header: &str) -> bool {
	let Some(hex_sig) = header.strip_prefix("sha256=") else {
		return false;
	};
	let Ok(expected) = hex::decode(hex_sig) else {
		return false;
	};
	let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
		return false;
	};
	mac.update(payload);
	mac.verify_slice(&expected).is_ok()
}

#[derive(Clone)]
pub struct SideEffects {
	audit: Option<Arc<AuditService>>,
	webhook: Arc<dyn WebhookDispatcher>,
	metrics: Arc<ProvisioningMetrics>,
}

impl SideEffects {
	pub fn new(
		audit: Option<Arc<AuditService>>,
		webhook: Arc<dyn WebhookDispatcher>,
		metrics: Arc<ProvisioningMetrics>,
	) -> Self {
		Self {
			audit,
			webhook,
			metrics,
		}
	}

	/// No audit, no webhooks.
	pub fn disabled(metrics: Arc<ProvisioningMetrics>) -> Self {
		Self::new(None, Arc::new(NoopWebhookDispatcher), metrics)
	}

	pub fn audit(&self, entry: AuditLogEntry) {
		let Some(audit) = &self.audit else {
			return;
		};
		if !audit.log(entry) {
			self.metrics.record_side_effect_failure("audit");
		}
	}

	/// Spawns delivery; returns immediately.
	pub fn notify(&self, event: ProvisioningEvent) {
		let webhook = Arc::clone(&self.webhook);
		let metrics = Arc::clone(&self.metrics);
		tokio::spawn(async move {
			if let Err(e) = webhook.dispatch(&event).await {
				metrics.record_side_effect_failure("webhook");
				warn!(
					event = %event.event,
					resource_id = %event.resource_id,
					error = %e,
					"webhook delivery failed"
				);
			}
		});
	}
}
