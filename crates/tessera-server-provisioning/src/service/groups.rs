// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Instant;

use chrono::Utc;
use tessera_scim::{GroupMember, ListResponse, Meta, PatchRequest, ScimGroup, SearchRequest};
use tessera_server_audit::{AuditEventType, AuditLogEntry};
use tessera_server_auth::ProvisioningScope;
use tessera_server_db::GroupMapping;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{apply_filter, window, ListQuery, ProvisioningService};
use crate::context::RequestContext;
use crate::error::{ProvisioningError, Result};
use crate::org_adapter::TeamRef;
use crate::patch::{MemberChange, MembershipDelta};

impl ProvisioningService {
	#[instrument(skip(self, ctx, group), fields(tenant_id = %ctx.tenant_id, display_name = %group.display_name))]
	pub async fn create_group(&self, ctx: &RequestContext, group: ScimGroup) -> Result<ScimGroup> {
		let started = Instant::now();
		let result = self.create_group_inner(ctx, group).await;
		self.observe("group", "create", started, &result);
		result
	}

	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn get_group(&self, ctx: &RequestContext, id: &str) -> Result<ScimGroup> {
		let started = Instant::now();
		let result = self.get_group_inner(ctx, id).await;
		self.observe("group", "get", started, &result);
		result
	}

	#[instrument(skip(self, ctx, group), fields(tenant_id = %ctx.tenant_id))]
	pub async fn replace_group(&self, ctx: &RequestContext, id: &str, group: ScimGroup) -> Result<ScimGroup> {
		let started = Instant::now();
		let result = self.replace_group_inner(ctx, id, group).await;
		self.observe("group", "replace", started, &result);
		result
	}

	#[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id, operations = patch.operations.len()))]
	pub async fn patch_group(&self, ctx: &RequestContext, id: &str, patch: PatchRequest) -> Result<ScimGroup> {
		let started = Instant::now();
		let result = self.patch_group_inner(ctx, id, patch).await;
		self.observe("group", "patch", started, &result);
		result
	}

	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn delete_group(&self, ctx: &RequestContext, id: &str) -> Result<()> {
		let started = Instant::now();
		let result = self.delete_group_inner(ctx, id).await;
		self.observe("group", "delete", started, &result);
		result
	}

	#[instrument(skip(self, ctx, query), fields(tenant_id = %ctx.tenant_id))]
	pub async fn list_groups(&self, ctx: &RequestContext, query: ListQuery) -> Result<ListResponse<ScimGroup>> {
		let started = Instant::now();
		let result = self.list_groups_inner(ctx, query).await;
		self.observe("group", "list", started, &result);
		result
	}

	pub async fn search_groups(&self, ctx: &RequestContext, request: SearchRequest) -> Result<ListResponse<ScimGroup>> {
		self.list_groups(
			ctx,
			ListQuery {
				filter: request.filter,
				start_index: request.start_index,
				count: request.count,
			},
		)
		.await
	}

	async fn create_group_inner(&self, ctx: &RequestContext, group: ScimGroup) -> Result<ScimGroup> {
		ctx.require(ProvisioningScope::GroupsWrite)?;
		let display_name = required_display_name(&group)?;
		let tenant = &ctx.tenant_id;

		if let Some(external_id) = group.external_id.as_deref() {
			if ctx
				.run(self.group_mappings.get_group_mapping_by_external_id(tenant, external_id))
				.await?
				.is_some()
			{
				return Err(ProvisioningError::Conflict(format!(
					"a group with externalId {external_id} already exists"
				)));
			}
		}

		let team = ctx.run(self.org.create_team(tenant, &display_name)).await?;
		let now = Utc::now();
		let mapping = GroupMapping {
			tenant_id: *tenant,
			scim_id: Uuid::new_v4().to_string(),
			external_id: group.external_id.clone(),
			team_ref: team.team_id.clone(),
			display_name,
			created_at: now,
			updated_at: now,
		};
		if let Err(e) = ctx.run(self.group_mappings.insert_group_mapping(&mapping)).await {
			if let Err(cleanup) = self.org.delete_team(tenant, &team.team_id).await {
				warn!(team_id = %team.team_id, error = %cleanup, "failed to remove orphaned team");
			}
			return Err(e);
		}

		let delta = self
			.apply_members(ctx, &team.team_id, &[MemberChange::Add(member_values(&group))])
			.await?;

		let created = self.to_scim_group(ctx, &mapping, &team).await?;
		info!(group_id = %mapping.scim_id, team_id = %team.team_id, members = delta.added.len(), "group provisioned");
		self.audit(
			ctx,
			AuditLogEntry::builder(AuditEventType::GroupCreated)
				.resource("Group", mapping.scim_id.clone())
				.details(serde_json::json!({
					"display_name": created.display_name,
					"members": delta.added.len(),
				})),
		);
		self.notify(
			ctx,
			"group.created",
			"Group",
			&mapping.scim_id,
			serde_json::to_value(&created).unwrap_or_default(),
		);
		Ok(created)
	}

	async fn get_group_inner(&self, ctx: &RequestContext, id: &str) -> Result<ScimGroup> {
		ctx.require(ProvisioningScope::GroupsRead)?;
		let (mapping, team) = self.resolve_group(ctx, id).await?;
		debug!(group_id = %id, "group read");
		self.to_scim_group(ctx, &mapping, &team).await
	}

	async fn replace_group_inner(&self, ctx: &RequestContext, id: &str, group: ScimGroup) -> Result<ScimGroup> {
		ctx.require(ProvisioningScope::GroupsWrite)?;
		let display_name = required_display_name(&group)?;
		let (mut mapping, mut team) = self.resolve_group(ctx, id).await?;
		self.check_group_external_id(ctx, &mapping, group.external_id.as_deref())
			.await?;

		if team.name != display_name {
			team = ctx
				.run(self.org.update_team(&ctx.tenant_id, &team.team_id, &display_name))
				.await?;
		}
		mapping.display_name = display_name;
		mapping.external_id = group.external_id.clone();
		ctx.run(self.group_mappings.update_group_mapping(&mapping)).await?;

		let delta = self
			.apply_members(ctx, &team.team_id, &[MemberChange::Replace(member_values(&group))])
			.await?;

		let replaced = self.to_scim_group(ctx, &mapping, &team).await?;
		self.after_group_update(ctx, &mapping, &delta, &replaced);
		Ok(replaced)
	}

	async fn patch_group_inner(&self, ctx: &RequestContext, id: &str, patch: PatchRequest) -> Result<ScimGroup> {
		ctx.require(ProvisioningScope::GroupsWrite)?;
		patch.validate()?;
		let plan = self.patch.plan_group(&patch.operations)?;
		let (mut mapping, mut team) = self.resolve_group(ctx, id).await?;
		let mut changed = false;

		if let Some(display_name) = plan.display_name.as_deref() {
			if display_name.trim().is_empty() {
				return Err(ProvisioningError::invalid_value("displayName cannot be empty"));
			}
		}
		if let Some(external_id) = &plan.external_id {
			if *external_id != mapping.external_id {
				self.check_group_external_id(ctx, &mapping, external_id.as_deref())
					.await?;
				mapping.external_id = external_id.clone();
				changed = true;
			}
		}
		if let Some(display_name) = plan.display_name.as_deref() {
			if team.name != display_name {
				team = ctx
					.run(self.org.update_team(&ctx.tenant_id, &team.team_id, display_name))
					.await?;
				mapping.display_name = display_name.to_string();
				changed = true;
			}
		}
		if changed {
			ctx.run(self.group_mappings.update_group_mapping(&mapping)).await?;
		}

		let delta = self
			.apply_members(ctx, &team.team_id, &plan.member_changes)
			.await?;

		let patched = self.to_scim_group(ctx, &mapping, &team).await?;
		if changed || !delta.is_empty() {
			self.after_group_update(ctx, &mapping, &delta, &patched);
		} else {
			debug!(group_id = %id, ignored = plan.ignored, "patch left group unchanged");
		}
		Ok(patched)
	}

	async fn delete_group_inner(&self, ctx: &RequestContext, id: &str) -> Result<()> {
		ctx.require(ProvisioningScope::GroupsWrite)?;
		let tenant = &ctx.tenant_id;
		let mapping = ctx
			.run(self.group_mappings.get_group_mapping(tenant, id))
			.await?
			.ok_or_else(|| ProvisioningError::NotFound(format!("group {id}")))?;

		if !ctx.run(self.org.delete_team(tenant, &mapping.team_ref)).await? {
			warn!(group_id = %id, team_id = %mapping.team_ref, "team already gone, removing mapping");
		}
		ctx.run(self.group_mappings.delete_group_mapping(tenant, id)).await?;

		info!(group_id = %id, "group deleted");
		self.audit(
			ctx,
			AuditLogEntry::builder(AuditEventType::GroupDeleted).resource("Group", id),
		);
		self.notify(ctx, "group.deleted", "Group", id, serde_json::Value::Null);
		Ok(())
	}

	async fn list_groups_inner(&self, ctx: &RequestContext, query: ListQuery) -> Result<ListResponse<ScimGroup>> {
		ctx.require(ProvisioningScope::GroupsRead)?;
		let page = self.page(query.start_index, query.count);
		let filter = self.compile_filter("group", query.filter.as_deref());
		let tenant = &ctx.tenant_id;

		let mappings = ctx.run(self.group_mappings.list_group_mappings(tenant)).await?;
		let mut groups = Vec::with_capacity(mappings.len());
		for mapping in &mappings {
			ctx.check()?;
			let Some(team) = ctx.run(self.org.get_team(tenant, &mapping.team_ref)).await? else {
				warn!(group_id = %mapping.scim_id, team_id = %mapping.team_ref, "group mapping points at a missing team");
				continue;
			};
			groups.push(self.to_scim_group(ctx, mapping, &team).await?);
		}

		let matched = apply_filter(groups, filter.as_ref());
		let total = matched.len();
		Ok(ListResponse::new(window(matched, page), total, page.start_index))
	}

	async fn resolve_group(&self, ctx: &RequestContext, id: &str) -> Result<(GroupMapping, TeamRef)> {
		let tenant = &ctx.tenant_id;
		let mapping = ctx
			.run(self.group_mappings.get_group_mapping(tenant, id))
			.await?
			.ok_or_else(|| ProvisioningError::NotFound(format!("group {id}")))?;
		let Some(team) = ctx.run(self.org.get_team(tenant, &mapping.team_ref)).await? else {
			warn!(group_id = %id, team_id = %mapping.team_ref, "group mapping points at a missing team");
			return Err(ProvisioningError::NotFound(format!("group {id}")));
		};
		Ok((mapping, team))
	}

	async fn check_group_external_id(
		&self,
		ctx: &RequestContext,
		mapping: &GroupMapping,
		external_id: Option<&str>,
	) -> Result<()> {
		let Some(external_id) = external_id else {
			return Ok(());
		};
		let holder = ctx
			.run(
				self.group_mappings
					.get_group_mapping_by_external_id(&ctx.tenant_id, external_id),
			)
			.await?;
		match holder {
			Some(holder) if holder.scim_id != mapping.scim_id => Err(ProvisioningError::Conflict(
				format!("externalId {external_id} belongs to another group"),
			)),
			_ => Ok(()),
		}
	}

	async fn apply_members(
		&self,
		ctx: &RequestContext,
		team_id: &str,
		changes: &[MemberChange],
	) -> Result<MembershipDelta> {
		if changes.iter().all(|c| matches!(c, MemberChange::Add(v) if v.is_empty())) {
			return Ok(MembershipDelta::default());
		}
		self.patch
			.apply_membership(ctx, self.org.as_ref(), team_id, changes)
			.await
	}

	fn after_group_update(&self, ctx: &RequestContext, mapping: &GroupMapping, delta: &MembershipDelta, group: &ScimGroup) {
		info!(
			group_id = %mapping.scim_id,
			added = delta.added.len(),
			removed = delta.removed.len(),
			"group updated"
		);
		self.audit(
			ctx,
			AuditLogEntry::builder(AuditEventType::GroupUpdated).resource("Group", mapping.scim_id.clone()),
		);
		for (event, accounts) in [
			(AuditEventType::GroupMemberAdded, &delta.added),
			(AuditEventType::GroupMemberRemoved, &delta.removed),
		] {
			if !accounts.is_empty() {
				self.audit(
					ctx,
					AuditLogEntry::builder(event)
						.resource("Group", mapping.scim_id.clone())
						.details(serde_json::json!({ "account_ids": accounts })),
				);
			}
		}
		self.notify(
			ctx,
			"group.updated",
			"Group",
			&mapping.scim_id,
			serde_json::to_value(group).unwrap_or_default(),
		);
	}

	async fn to_scim_group(&self, ctx: &RequestContext, mapping: &GroupMapping, team: &TeamRef) -> Result<ScimGroup> {
		let members = ctx
			.run(self.org.list_team_members(&ctx.tenant_id, &team.team_id))
			.await?
			.into_iter()
			.map(|m| {
				let value = m.account_id.to_string();
				GroupMember {
					ref_: Some(self.user_location(&value)),
					value,
					display: None,
				}
			})
			.collect();

		Ok(ScimGroup {
			schemas: vec![tessera_scim::SCHEMA_CORE_GROUP.to_string()],
			id: Some(mapping.scim_id.clone()),
			external_id: mapping.external_id.clone(),
			display_name: team.name.clone(),
			members,
			meta: Some(Meta::new(
				"Group",
				mapping.created_at,
				mapping.updated_at.max(team.updated_at),
				Some(self.group_location(&mapping.scim_id)),
			)),
		})
	}
}

fn required_display_name(group: &ScimGroup) -> Result<String> {
	let name = group.display_name.trim();
	if name.is_empty() {
		return Err(ProvisioningError::invalid_value("displayName is required"));
	}
	Ok(name.to_string())
}

fn member_values(group: &ScimGroup) -> Vec<String> {
	group.members.iter().map(|m| m.value.clone()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::service::test_support::{app_harness, harness, Harness};
	use tessera_scim::{GroupReference, PatchOp, PatchOperation, ScimEmail, ScimErrorType, ScimUser};

	async fn user(h: &Harness, name: &str) -> String {
		let mut user = ScimUser::new(name);
		user.emails = vec![ScimEmail::work(format!("{name}@example.com"))];
		h.service.create_user(&h.ctx, user).await.unwrap().id.unwrap()
	}

	fn scim_group(name: &str, members: &[&str]) -> ScimGroup {
		let mut group = ScimGroup::new(name);
		group.members = members.iter().map(|m| GroupMember::new(*m)).collect();
		group
	}

	fn member_ids(group: &ScimGroup) -> Vec<String> {
		let mut ids: Vec<_> = group.members.iter().map(|m| m.value.clone()).collect();
		ids.sort();
		ids
	}

	fn patch(op: PatchOp, path: &str, value: serde_json::Value) -> PatchRequest {
		PatchRequest::new(vec![PatchOperation::new(op, Some(path), Some(value))])
	}

	#[tokio::test]
	async fn group_lifecycle_on_both_backends() {
		for h in [harness().await, app_harness().await] {
			let alice = user(&h, "alice").await;
			let bob = user(&h, "bob").await;

			let created = h
				.service
				.create_group(&h.ctx, scim_group("Engineering", &[&alice]))
				.await
				.unwrap();
			let id = created.id.clone().unwrap();
			assert_eq!(created.display_name, "Engineering");
			assert_eq!(member_ids(&created), vec![alice.clone()]);

			let patched = h
				.service
				.patch_group(
					&h.ctx,
					&id,
					patch(PatchOp::Add, "members", serde_json::json!([{ "value": bob }])),
				)
				.await
				.unwrap();
			let mut expected = vec![alice.clone(), bob.clone()];
			expected.sort();
			assert_eq!(member_ids(&patched), expected);

			let replaced = h
				.service
				.replace_group(&h.ctx, &id, scim_group("Platform", &[&bob]))
				.await
				.unwrap();
			assert_eq!(replaced.display_name, "Platform");
			assert_eq!(member_ids(&replaced), vec![bob.clone()]);

			h.service.delete_group(&h.ctx, &id).await.unwrap();
			let err = h.service.get_group(&h.ctx, &id).await.unwrap_err();
			assert_eq!(err.status_code(), 404);
		}
	}

	#[tokio::test]
	async fn adding_members_twice_is_idempotent() {
		let h = harness().await;
		let alice = user(&h, "alice").await;
		let created = h
			.service
			.create_group(&h.ctx, scim_group("Ops", &[]))
			.await
			.unwrap();
		let id = created.id.unwrap();

		let add = patch(PatchOp::Add, "members", serde_json::json!([{ "value": alice }]));
		let once = h.service.patch_group(&h.ctx, &id, add.clone()).await.unwrap();
		let twice = h.service.patch_group(&h.ctx, &id, add).await.unwrap();
		assert_eq!(member_ids(&once), member_ids(&twice));
		assert_eq!(twice.members.len(), 1);
	}

	#[tokio::test]
	async fn remove_member_by_filter_path() {
		let h = harness().await;
		let alice = user(&h, "alice").await;
		let created = h
			.service
			.create_group(&h.ctx, scim_group("Ops", &[&alice]))
			.await
			.unwrap();
		let id = created.id.unwrap();

		let path = format!("members[value eq \"{alice}\"]");
		let remove = PatchRequest::new(vec![PatchOperation::new(PatchOp::Remove, Some(&path), None)]);
		let patched = h.service.patch_group(&h.ctx, &id, remove).await.unwrap();
		assert!(patched.members.is_empty());
	}

	#[tokio::test]
	async fn unknown_members_are_skipped() {
		let h = harness().await;
		let created = h
			.service
			.create_group(&h.ctx, scim_group("Ops", &["not-a-user", "6f1c7a52-0000-4000-8000-000000000000"]))
			.await
			.unwrap();
		assert!(created.members.is_empty());
	}

	#[tokio::test]
	async fn group_requires_display_name_and_unique_external_id() {
		let h = harness().await;
		let err = h
			.service
			.create_group(&h.ctx, scim_group("  ", &[]))
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 400);

		let mut first = scim_group("A", &[]);
		first.external_id = Some("g-1".to_string());
		h.service.create_group(&h.ctx, first).await.unwrap();
		let mut second = scim_group("B", &[]);
		second.external_id = Some("g-1".to_string());
		let err = h.service.create_group(&h.ctx, second).await.unwrap_err();
		assert_eq!(err.status_code(), 409);
	}

	async fn one_and_two(h: &Harness) -> String {
		let mut one = scim_group("One", &[]);
		one.external_id = Some("ext-1".to_string());
		h.service.create_group(&h.ctx, one).await.unwrap();
		h.service
			.create_group(&h.ctx, scim_group("Two", &[]))
			.await
			.unwrap()
			.id
			.unwrap()
	}

	#[tokio::test]
	async fn replace_with_taken_external_id_keeps_team_name() {
		for h in [harness().await, app_harness().await] {
			let two = one_and_two(&h).await;

			let mut next = scim_group("Renamed", &[]);
			next.external_id = Some("ext-1".to_string());
			let err = h.service.replace_group(&h.ctx, &two, next).await.unwrap_err();
			assert_eq!(err.status_code(), 409);

			let fetched = h.service.get_group(&h.ctx, &two).await.unwrap();
			assert_eq!(fetched.display_name, "Two");
			assert_eq!(fetched.external_id, None);
		}
	}

	#[tokio::test]
	async fn patch_with_taken_external_id_keeps_team_name() {
		let h = harness().await;
		let two = one_and_two(&h).await;

		let patch = PatchRequest::new(vec![
			PatchOperation::new(PatchOp::Replace, Some("displayName"), Some(serde_json::json!("Renamed"))),
			PatchOperation::new(PatchOp::Replace, Some("externalId"), Some(serde_json::json!("ext-1"))),
		]);
		let err = h.service.patch_group(&h.ctx, &two, patch).await.unwrap_err();
		assert_eq!(err.status_code(), 409);

		let fetched = h.service.get_group(&h.ctx, &two).await.unwrap();
		assert_eq!(fetched.display_name, "Two");
		assert_eq!(fetched.external_id, None);
	}

	#[tokio::test]
	async fn structurally_invalid_group_patch_is_rejected() {
		let h = harness().await;
		let id = h
			.service
			.create_group(&h.ctx, scim_group("Ops", &[]))
			.await
			.unwrap()
			.id
			.unwrap();

		let missing_schema = PatchRequest {
			schemas: vec![],
			operations: vec![],
		};
		let err = h.service.patch_group(&h.ctx, &id, missing_schema).await.unwrap_err();
		assert_eq!(err.scim_type(), Some(ScimErrorType::InvalidSyntax));

		let err = h
			.service
			.patch_group(&h.ctx, &id, PatchRequest::new(vec![]))
			.await
			.unwrap_err();
		assert_eq!(err.scim_type(), Some(ScimErrorType::InvalidSyntax));

		let remove_all = PatchRequest::new(vec![PatchOperation::new(PatchOp::Remove, None, None)]);
		let err = h.service.patch_group(&h.ctx, &id, remove_all).await.unwrap_err();
		assert_eq!(err.status_code(), 400);
		assert_eq!(err.scim_type(), Some(ScimErrorType::InvalidPath));
	}

	#[tokio::test]
	async fn list_groups_filters_and_pages() {
		let h = harness().await;
		for name in ["alpha", "beta", "gamma"] {
			h.service
				.create_group(&h.ctx, scim_group(name, &[]))
				.await
				.unwrap();
		}

		let all = h.service.list_groups(&h.ctx, ListQuery::default()).await.unwrap();
		assert_eq!(all.total_results, 3);

		let filtered = h
			.service
			.list_groups(
				&h.ctx,
				ListQuery {
					filter: Some("displayName co \"MM\"".to_string()),
					..ListQuery::default()
				},
			)
			.await
			.unwrap();
		assert_eq!(filtered.total_results, 1);
		assert_eq!(filtered.resources[0].display_name, "gamma");

		let page = h
			.service
			.list_groups(
				&h.ctx,
				ListQuery {
					start_index: Some(2),
					count: Some(1),
					..ListQuery::default()
				},
			)
			.await
			.unwrap();
		assert_eq!(page.total_results, 3);
		assert_eq!(page.resources.len(), 1);
	}

	#[tokio::test]
	async fn user_create_joins_referenced_groups() {
		let h = harness().await;
		let group = h
			.service
			.create_group(&h.ctx, scim_group("Sales", &[]))
			.await
			.unwrap();
		let group_id = group.id.unwrap();

		let mut carol = ScimUser::new("carol");
		carol.emails = vec![ScimEmail::work("carol@example.com")];
		carol.groups = vec![
			GroupReference {
				value: group_id.clone(),
				ref_: None,
				display: None,
			},
			GroupReference {
				value: "missing".to_string(),
				ref_: None,
				display: None,
			},
		];
		let carol = h.service.create_user(&h.ctx, carol).await.unwrap();

		let fetched = h.service.get_group(&h.ctx, &group_id).await.unwrap();
		assert_eq!(member_ids(&fetched), vec![carol.id.unwrap()]);
	}
}
