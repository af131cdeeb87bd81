// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuditSinkError;
use crate::event::AuditLogEntry;
use crate::filter::AuditFilterConfig;

mod provisioning_log;
mod tracing;

pub use self::provisioning_log::ProvisioningLogSink;
pub use self::tracing::TracingAuditSink;

#[async_trait]
pub trait AuditSink: Send + Sync {
	/// Unique name used in logs.
	fn name(&self) -> &str;

	fn filter(&self) -> &AuditFilterConfig;

	async fn publish(&self, entry: Arc<AuditLogEntry>) -> Result<(), AuditSinkError>;
}
