// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use super::AuditSink;
use crate::error::AuditSinkError;
use crate::event::{AuditLogEntry, AuditSeverity};
use crate::filter::AuditFilterConfig;

pub struct TracingAuditSink {
	filter: AuditFilterConfig,
}

impl TracingAuditSink {
	pub fn new(filter: AuditFilterConfig) -> Self {
		Self { filter }
	}
}

macro_rules! emit {
	($severity:expr, $($fields:tt)*) => {
		match $severity {
			AuditSeverity::Debug => tracing::debug!(target: "audit", $($fields)*),
			AuditSeverity::Info | AuditSeverity::Notice => tracing::info!(target: "audit", $($fields)*),
			AuditSeverity::Warning => tracing::warn!(target: "audit", $($fields)*),
			AuditSeverity::Error | AuditSeverity::Critical => {
				tracing::error!(target: "audit", $($fields)*)
			}
		}
	};
}

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	fn filter(&self) -> &AuditFilterConfig {
		&self.filter
	}

	async fn publish(&self, entry: Arc<AuditLogEntry>) -> Result<(), AuditSinkError> {
		let tenant_id = entry.tenant_id.map(|t| t.to_string());
		let token_id = entry.token_id.map(|t| t.to_string());
		emit!(
			entry.severity,
			audit_id = %entry.id,
			event_type = %entry.event_type,
			severity = %entry.severity,
			outcome = entry.outcome.as_str(),
			tenant_id = tenant_id.as_deref(),
			token_id = token_id.as_deref(),
			resource_type = entry.resource_type.as_deref(),
			resource_id = entry.resource_id.as_deref(),
			request_id = entry.request_id.as_deref(),
			details = %entry.details,
			"{}",
			entry.action
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::AuditEventType;

	#[tokio::test]
	async fn publish_never_fails() {
		let sink = TracingAuditSink::new(AuditFilterConfig::default());
		let entry = Arc::new(AuditLogEntry::builder(AuditEventType::TokenRevoked).build());
		assert!(sink.publish(entry).await.is_ok());
	}

	#[tokio::test]
	async fn publishes_every_severity() {
		let sink = TracingAuditSink::new(AuditFilterConfig::default());
		for severity in [
			AuditSeverity::Debug,
			AuditSeverity::Notice,
			AuditSeverity::Warning,
			AuditSeverity::Critical,
		] {
			let entry = AuditLogEntry::builder(AuditEventType::UserUpdated)
				.severity(severity)
				.build();
			assert!(sink.publish(Arc::new(entry)).await.is_ok());
		}
	}
}
