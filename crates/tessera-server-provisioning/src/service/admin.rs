// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant administration: attribute mappings, settings and the provisioning log.

use tessera_server_audit::{AuditEventType, AuditLogEntry};
use tessera_server_auth::ProvisioningScope;
use tessera_server_db::{AttributeMapping, ProvisioningLogEntry, TenantSettings};
use tracing::{info, instrument};

use super::ProvisioningService;
use crate::attribute_map::AttributeMap;
use crate::context::RequestContext;
use crate::error::Result;

/// Upper bound on log entries returned by one call.
pub const MAX_LOG_ENTRIES: u32 = 1000;

impl ProvisioningService {
	/// The effective mappings: stored overrides, or the defaults when the
	/// tenant has none.
	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn attribute_mappings(&self, ctx: &RequestContext) -> Result<Vec<AttributeMapping>> {
		ctx.require(ProvisioningScope::Admin)?;
		Ok(self.attribute_map(ctx).await?.to_mappings())
	}

	/// Replaces the tenant's overrides. Overrides layer on the defaults, so an
	/// empty list restores them.
	#[instrument(skip(self, ctx, mappings), fields(tenant_id = %ctx.tenant_id, count = mappings.len()))]
	pub async fn replace_attribute_mappings(
		&self,
		ctx: &RequestContext,
		mappings: Vec<AttributeMapping>,
	) -> Result<Vec<AttributeMapping>> {
		ctx.require(ProvisioningScope::Admin)?;
		AttributeMap::validate_mappings(&mappings)?;
		ctx.run(
			self.attribute_mappings
				.replace_attribute_mappings(&ctx.tenant_id, &mappings),
		)
		.await?;

		info!("attribute mappings replaced");
		self.audit(
			ctx,
			AuditLogEntry::builder(AuditEventType::AttributeMappingsUpdated)
				.details(serde_json::json!({ "count": mappings.len() })),
		);
		Ok(AttributeMap::from_mappings(&mappings).to_mappings())
	}

	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn settings(&self, ctx: &RequestContext) -> Result<TenantSettings> {
		ctx.require(ProvisioningScope::Admin)?;
		self.tenant_settings(ctx).await
	}

	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn update_settings(&self, ctx: &RequestContext, settings: TenantSettings) -> Result<TenantSettings> {
		ctx.require(ProvisioningScope::Admin)?;
		ctx.run(self.settings.put_tenant_settings(&ctx.tenant_id, &settings))
			.await?;
		info!(
			prevent_duplicates = settings.prevent_duplicates,
			auto_activate = settings.auto_activate,
			sync_groups = settings.sync_groups,
			"tenant settings updated"
		);
		Ok(settings)
	}

	/// Most recent entries first.
	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn provisioning_logs(&self, ctx: &RequestContext, limit: Option<u32>) -> Result<Vec<ProvisioningLogEntry>> {
		ctx.require(ProvisioningScope::Admin)?;
		let limit = limit.unwrap_or(100).clamp(1, MAX_LOG_ENTRIES);
		Ok(ctx.run(self.logs.list_logs(&ctx.tenant_id, limit)).await?)
	}
}
