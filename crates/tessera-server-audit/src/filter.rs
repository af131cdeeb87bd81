// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::event::{AuditEventType, AuditLogEntry, AuditSeverity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFilterConfig {
	pub min_severity: AuditSeverity,
	pub exclude_events: Vec<AuditEventType>,
	/// Drop entries that carry no tenant.
	pub require_tenant: bool,
}

impl Default for AuditFilterConfig {
	fn default() -> Self {
		Self {
			min_severity: AuditSeverity::Info,
			exclude_events: Vec::new(),
			require_tenant: false,
		}
	}
}

impl AuditFilterConfig {
	pub fn tenant_scoped() -> Self {
		Self {
			require_tenant: true,
			..Self::default()
		}
	}

	pub fn allows(&self, entry: &AuditLogEntry) -> bool {
		if entry.severity < self.min_severity {
			return false;
		}
		if self.require_tenant && entry.tenant_id.is_none() {
			return false;
		}
		!self.exclude_events.contains(&entry.event_type)
	}
}
