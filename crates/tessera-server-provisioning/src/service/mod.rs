// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resource lifecycle orchestration.
//!
//! [`ProvisioningService`] is the single entry point the HTTP layer calls.
//! It checks scopes, drives the identity store and the organization adapter,
//! keeps the mapping tables in step and dispatches side effects once the
//! primary mutation has committed.

mod admin;
mod groups;
mod users;

pub use admin::MAX_LOG_ENTRIES;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tessera_scim::{BulkRequest, BulkResponse, CompiledFilter, FilterTarget};
use tessera_server_audit::{AuditEventType, AuditLogEntry};
use tessera_server_db::{
	AttributeMappingStore, GroupMappingStore, ProvisioningLogStore, TenantSettings, TenantSettingsStore,
	UserMappingStore,
};
use tracing::warn;

use crate::attribute_map::AttributeMap;
use crate::bulk::{BulkAction, BulkCoordinator, BulkOutcome, BulkTarget};
use crate::context::RequestContext;
use crate::error::Result;
use crate::identity::IdentityStore;
use crate::metrics::ProvisioningMetrics;
use crate::org_adapter::OrgAdapter;
use crate::patch::PatchEngine;
use crate::side_effects::{ProvisioningEvent, SideEffects};

/// Members fetched per backend call when a filter forces a full scan.
const SCAN_CHUNK: usize = 200;

/// Collaborators the service drives.
pub struct ServiceDeps {
	pub identity: Arc<dyn IdentityStore>,
	pub org: Arc<dyn OrgAdapter>,
	pub group_mappings: Arc<dyn GroupMappingStore>,
	pub user_mappings: Arc<dyn UserMappingStore>,
	pub attribute_mappings: Arc<dyn AttributeMappingStore>,
	pub settings: Arc<dyn TenantSettingsStore>,
	pub logs: Arc<dyn ProvisioningLogStore>,
	pub side_effects: SideEffects,
	pub metrics: Arc<ProvisioningMetrics>,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
	/// Absolute base of resource locations, e.g. `https://host/scim/v2`.
	pub base_url: String,
	pub max_results: usize,
	pub default_page_size: usize,
	pub max_bulk_operations: usize,
	pub max_bulk_payload_bytes: usize,
	/// Applied to tenants that never stored settings.
	pub default_settings: TenantSettings,
}

impl Default for ServiceOptions {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:8080/scim/v2".to_string(),
			max_results: 1000,
			default_page_size: 100,
			max_bulk_operations: 1000,
			max_bulk_payload_bytes: 1_048_576,
			default_settings: TenantSettings::default(),
		}
	}
}

/// `GET` list parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
	#[serde(default)]
	pub filter: Option<String>,
	#[serde(default)]
	pub start_index: Option<usize>,
	#[serde(default)]
	pub count: Option<usize>,
}

/// A resolved page window. `offset` is zero-based; `start_index` is the
/// one-based index echoed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
	offset: usize,
	start_index: usize,
	count: usize,
}

pub struct ProvisioningService {
	identity: Arc<dyn IdentityStore>,
	org: Arc<dyn OrgAdapter>,
	group_mappings: Arc<dyn GroupMappingStore>,
	user_mappings: Arc<dyn UserMappingStore>,
	attribute_mappings: Arc<dyn AttributeMappingStore>,
	settings: Arc<dyn TenantSettingsStore>,
	logs: Arc<dyn ProvisioningLogStore>,
	side_effects: SideEffects,
	metrics: Arc<ProvisioningMetrics>,
	patch: PatchEngine,
	bulk: BulkCoordinator,
	options: ServiceOptions,
}

impl ProvisioningService {
	pub fn new(deps: ServiceDeps, options: ServiceOptions) -> Self {
		let base_url = options.base_url.trim_end_matches('/').to_string();
		Self {
			patch: PatchEngine::new(Arc::clone(&deps.metrics)),
			bulk: BulkCoordinator::new(
				options.max_bulk_operations,
				options.max_bulk_payload_bytes,
				Arc::clone(&deps.metrics),
			),
			identity: deps.identity,
			org: deps.org,
			group_mappings: deps.group_mappings,
			user_mappings: deps.user_mappings,
			attribute_mappings: deps.attribute_mappings,
			settings: deps.settings,
			logs: deps.logs,
			side_effects: deps.side_effects,
			metrics: deps.metrics,
			options: ServiceOptions { base_url, ..options },
		}
	}

	pub fn options(&self) -> &ServiceOptions {
		&self.options
	}

	pub fn metrics(&self) -> &Arc<ProvisioningMetrics> {
		&self.metrics
	}

	pub fn backend_name(&self) -> &'static str {
		self.org.backend_name()
	}

	pub fn bulk_coordinator(&self) -> &BulkCoordinator {
		&self.bulk
	}

	/// Runs a bulk request against this service.
	pub async fn bulk(&self, ctx: &RequestContext, request: BulkRequest, payload_bytes: usize) -> Result<BulkResponse> {
		let started = Instant::now();
		let result = self.bulk.process(ctx, self, request, payload_bytes).await;
		self.observe("bulk", "process", started, &result);

		if let Ok(response) = &result {
			let failures = response.operations.iter().filter(|r| r.is_failure()).count();
			self.audit(
				ctx,
				AuditLogEntry::builder(AuditEventType::BulkProcessed).details(serde_json::json!({
					"operations": response.operations.len(),
					"failures": failures,
				})),
			);
		}
		result
	}

	pub(crate) fn user_location(&self, id: &str) -> String {
		format!("{}/Users/{id}", self.options.base_url)
	}

	pub(crate) fn group_location(&self, id: &str) -> String {
		format!("{}/Groups/{id}", self.options.base_url)
	}

	pub(crate) async fn tenant_settings(&self, ctx: &RequestContext) -> Result<TenantSettings> {
		Ok(ctx
			.run(self.settings.get_tenant_settings(&ctx.tenant_id))
			.await?
			.unwrap_or_else(|| self.options.default_settings.clone()))
	}

	pub(crate) async fn attribute_map(&self, ctx: &RequestContext) -> Result<AttributeMap> {
		let mappings = ctx
			.run(self.attribute_mappings.get_attribute_mappings(&ctx.tenant_id))
			.await?;
		Ok(AttributeMap::from_mappings(&mappings))
	}

	fn page(&self, start_index: Option<usize>, count: Option<usize>) -> Page {
		let start_index = start_index.unwrap_or(1).max(1);
		let count = count
			.unwrap_or(self.options.default_page_size)
			.min(self.options.max_results);
		Page {
			offset: start_index - 1,
			start_index,
			count,
		}
	}

	/// Compiles a list filter. A filter that fails open is counted, logged
	/// and then treated as absent.
	fn compile_filter(&self, resource: &str, filter: Option<&str>) -> Option<CompiledFilter> {
		let raw = filter.map(str::trim).filter(|f| !f.is_empty())?;
		let compiled = CompiledFilter::compile(raw);
		if let Some(reason) = compiled.fail_open_reason() {
			self.metrics.record_filter_fail_open(reason.label());
			warn!(resource, filter = raw, reason = %reason, "filter not understood, returning unfiltered results");
			return None;
		}
		Some(compiled)
	}

	fn observe<T>(&self, resource: &str, operation: &str, started: Instant, result: &Result<T>) {
		let outcome = match result {
			Ok(_) => "success",
			Err(e) => e.kind(),
		};
		self.metrics
			.record_operation(resource, operation, outcome, started.elapsed());
	}

	pub(crate) fn audit(&self, ctx: &RequestContext, builder: tessera_server_audit::AuditLogBuilder) {
		let mut builder = builder.tenant(ctx.tenant_id).request_id(ctx.request_id.clone());
		if let Some(token_id) = ctx.token_id {
			builder = builder.token(token_id);
		}
		self.side_effects.audit(builder.build());
	}

	pub(crate) fn notify(&self, ctx: &RequestContext, event: &str, resource_type: &str, resource_id: &str, data: Value) {
		self.side_effects.notify(ProvisioningEvent::new(
			event,
			ctx.tenant_id,
			resource_type,
			resource_id,
			data,
		));
	}
}

fn apply_filter<T: FilterTarget>(items: Vec<T>, filter: Option<&CompiledFilter>) -> Vec<T> {
	match filter {
		Some(filter) => items.into_iter().filter(|item| filter.matches(item)).collect(),
		None => items,
	}
}

fn window<T>(items: Vec<T>, page: Page) -> Vec<T> {
	items.into_iter().skip(page.offset).take(page.count).collect()
}

#[async_trait]
impl BulkTarget for ProvisioningService {
	async fn execute(&self, ctx: &RequestContext, action: BulkAction) -> Result<BulkOutcome> {
		match action {
			BulkAction::CreateUser(user) => {
				let created = self.create_user(ctx, user).await?;
				Ok(self.user_outcome(201, created))
			}
			BulkAction::ReplaceUser { id, user } => {
				let replaced = self.replace_user(ctx, &id, user).await?;
				Ok(self.user_outcome(200, replaced))
			}
			BulkAction::PatchUser { id, patch } => {
				let patched = self.patch_user(ctx, &id, patch).await?;
				Ok(self.user_outcome(200, patched))
			}
			BulkAction::DeleteUser { id } => {
				self.delete_user(ctx, &id).await?;
				Ok(BulkOutcome {
					status: 204,
					location: Some(self.user_location(&id)),
					resource_id: Some(id),
					body: None,
				})
			}
			BulkAction::CreateGroup(group) => {
				let created = self.create_group(ctx, group).await?;
				Ok(self.group_outcome(201, created))
			}
			BulkAction::ReplaceGroup { id, group } => {
				let replaced = self.replace_group(ctx, &id, group).await?;
				Ok(self.group_outcome(200, replaced))
			}
			BulkAction::PatchGroup { id, patch } => {
				let patched = self.patch_group(ctx, &id, patch).await?;
				Ok(self.group_outcome(200, patched))
			}
			BulkAction::DeleteGroup { id } => {
				self.delete_group(ctx, &id).await?;
				Ok(BulkOutcome {
					status: 204,
					location: Some(self.group_location(&id)),
					resource_id: Some(id),
					body: None,
				})
			}
		}
	}
}

impl ProvisioningService {
	fn user_outcome(&self, status: u16, user: tessera_scim::ScimUser) -> BulkOutcome {
		let id = user.id.clone().unwrap_or_default();
		BulkOutcome {
			status,
			location: Some(self.user_location(&id)),
			resource_id: Some(id),
			body: serde_json::to_value(&user).ok(),
		}
	}

	fn group_outcome(&self, status: u16, group: tessera_scim::ScimGroup) -> BulkOutcome {
		let id = group.id.clone().unwrap_or_default();
		BulkOutcome {
			status,
			location: Some(self.group_location(&id)),
			resource_id: Some(id),
			body: serde_json::to_value(&group).ok(),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::test_support::harness;
	use super::*;

	#[tokio::test]
	async fn page_window_is_clamped() {
		let h = harness().await;
		let page = h.service.page(Some(0), Some(5000));
		assert_eq!(page.start_index, 1);
		assert_eq!(page.offset, 0);
		assert_eq!(page.count, 1000);

		let page = h.service.page(None, None);
		assert_eq!(page.count, 100);
	}

	#[tokio::test]
	async fn fail_open_filter_is_dropped_and_counted() {
		let h = harness().await;
		assert!(h.service.compile_filter("user", Some("userName")).is_none());
		assert!(h.service.compile_filter("user", Some("  ")).is_none());
		assert!(h
			.service
			.compile_filter("user", Some("userName eq \"a\""))
			.is_some());
		let text = h.service.metrics().gather_metrics().unwrap();
		assert!(text.contains("filter_fail_open_total{reason=\"too_few_tokens\"} 1"));
	}
}
