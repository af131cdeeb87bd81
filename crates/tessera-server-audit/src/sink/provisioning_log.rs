// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use tessera_server_db::{ProvisioningLogEntry, ProvisioningLogStore};

use super::AuditSink;
use crate::error::AuditSinkError;
use crate::event::AuditLogEntry;
use crate::filter::AuditFilterConfig;

/// Persists tenant-scoped entries into the provisioning log read by the admin surface.
pub struct ProvisioningLogSink {
	store: Arc<dyn ProvisioningLogStore>,
	filter: AuditFilterConfig,
}

impl ProvisioningLogSink {
	pub fn new(store: Arc<dyn ProvisioningLogStore>) -> Self {
		Self {
			store,
			filter: AuditFilterConfig::tenant_scoped(),
		}
	}
}

#[async_trait]
impl AuditSink for ProvisioningLogSink {
	fn name(&self) -> &str {
		"provisioning_log"
	}

	fn filter(&self) -> &AuditFilterConfig {
		&self.filter
	}

	async fn publish(&self, entry: Arc<AuditLogEntry>) -> Result<(), AuditSinkError> {
		let Some(tenant_id) = entry.tenant_id else {
			return Ok(());
		};

		let record = ProvisioningLogEntry {
			id: entry.id.to_string(),
			tenant_id,
			event_type: entry.event_type.to_string(),
			resource_type: entry.resource_type.clone(),
			resource_id: entry.resource_id.clone(),
			outcome: entry.outcome.as_str().to_string(),
			details: entry.details.clone(),
			created_at: entry.timestamp,
		};

		self.store.append_log(&record).await?;
		Ok(())
	}
}
