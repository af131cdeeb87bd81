// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Instant;

use chrono::Utc;
use tessera_scim::{
	GroupReference, ListResponse, Meta, Name, PatchRequest, ScimEmail, ScimUser, SearchRequest,
};
use tessera_server_audit::{AuditEventType, AuditLogEntry};
use tessera_server_auth::{AccountId, ProvisioningScope};
use tessera_server_db::{DeleteMode, UserMapping};
use tracing::{debug, info, instrument, warn};

use super::{apply_filter, window, ListQuery, ProvisioningService, SCAN_CHUNK};
use crate::context::RequestContext;
use crate::error::{ProvisioningError, Result};
use crate::identity::{Account, NewAccount};
use crate::org_adapter::MemberRef;

/// A tenant member's account together with its external id mapping.
struct ResolvedUser {
	account: Account,
	mapping: Option<UserMapping>,
}

impl ResolvedUser {
	fn external_id(&self) -> Option<String> {
		self.mapping.as_ref().and_then(|m| m.external_id.clone())
	}
}

impl ProvisioningService {
	#[instrument(skip(self, ctx, user), fields(tenant_id = %ctx.tenant_id, user_name = %user.user_name))]
	pub async fn create_user(&self, ctx: &RequestContext, user: ScimUser) -> Result<ScimUser> {
		let started = Instant::now();
		let result = self.create_user_inner(ctx, user).await;
		self.observe("user", "create", started, &result);
		result
	}

	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn get_user(&self, ctx: &RequestContext, id: &str) -> Result<ScimUser> {
		let started = Instant::now();
		let result = self.get_user_inner(ctx, id).await;
		self.observe("user", "get", started, &result);
		result
	}

	#[instrument(skip(self, ctx, user), fields(tenant_id = %ctx.tenant_id))]
	pub async fn replace_user(&self, ctx: &RequestContext, id: &str, user: ScimUser) -> Result<ScimUser> {
		let started = Instant::now();
		let result = self.replace_user_inner(ctx, id, user).await;
		self.observe("user", "replace", started, &result);
		result
	}

	#[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id, operations = patch.operations.len()))]
	pub async fn patch_user(&self, ctx: &RequestContext, id: &str, patch: PatchRequest) -> Result<ScimUser> {
		let started = Instant::now();
		let result = self.patch_user_inner(ctx, id, patch).await;
		self.observe("user", "patch", started, &result);
		result
	}

	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn delete_user(&self, ctx: &RequestContext, id: &str) -> Result<()> {
		let started = Instant::now();
		let result = self.delete_user_inner(ctx, id).await;
		self.observe("user", "delete", started, &result);
		result
	}

	#[instrument(skip(self, ctx, query), fields(tenant_id = %ctx.tenant_id))]
	pub async fn list_users(&self, ctx: &RequestContext, query: ListQuery) -> Result<ListResponse<ScimUser>> {
		let started = Instant::now();
		let result = self.list_users_inner(ctx, query).await;
		self.observe("user", "list", started, &result);
		result
	}

	/// `POST /.search`: a list with the query carried in the body.
	pub async fn search_users(&self, ctx: &RequestContext, request: SearchRequest) -> Result<ListResponse<ScimUser>> {
		self.list_users(
			ctx,
			ListQuery {
				filter: request.filter,
				start_index: request.start_index,
				count: request.count,
			},
		)
		.await
	}

	async fn create_user_inner(&self, ctx: &RequestContext, user: ScimUser) -> Result<ScimUser> {
		ctx.require(ProvisioningScope::UsersWrite)?;
		let (user_name, email) = required_identity(&user)?;
		let tenant = &ctx.tenant_id;
		let settings = self.tenant_settings(ctx).await?;

		if let Some(external_id) = user.external_id.as_deref() {
			if ctx
				.run(self.user_mappings.get_user_mapping_by_external_id(tenant, external_id))
				.await?
				.is_some()
			{
				return Err(ProvisioningError::Conflict(format!(
					"a user with externalId {external_id} already exists"
				)));
			}
		}

		let account = match ctx.run(self.identity.find_account_by_email(&email)).await? {
			Some(_) if settings.prevent_duplicates => {
				return Err(ProvisioningError::Conflict(format!(
					"a user with email {email} already exists"
				)));
			}
			Some(existing) => {
				if ctx.run(self.org.is_member(tenant, &existing.id)).await? {
					return Err(ProvisioningError::Conflict(format!(
						"a user with email {email} is already provisioned"
					)));
				}
				info!(account_id = %existing.id, "linking existing account");
				existing
			}
			None => {
				let name = user.name.clone().unwrap_or_default();
				ctx.run(self.identity.create_account(NewAccount {
					email,
					user_name,
					display_name: user.resolved_display_name(),
					given_name: name.given_name,
					family_name: name.family_name,
					active: settings.auto_activate && user.active,
				}))
				.await?
			}
		};

		let member = ctx.run(self.org.add_member(tenant, &account.id)).await?;

		let now = Utc::now();
		let mapping = UserMapping {
			tenant_id: *tenant,
			account_id: account.id.to_string(),
			external_id: user.external_id.clone(),
			created_at: now,
			updated_at: now,
		};
		ctx.run(self.user_mappings.upsert_user_mapping(&mapping)).await?;

		if settings.sync_groups && !user.groups.is_empty() {
			self.sync_user_groups(ctx, &member, &user.groups).await?;
		}

		let created = self.to_scim_user(&account, mapping.external_id);
		info!(account_id = %account.id, backend = self.org.backend_name(), "user provisioned");
		self.audit(
			ctx,
			AuditLogEntry::builder(AuditEventType::UserCreated)
				.resource("User", account.id.to_string())
				.details(serde_json::json!({ "user_name": created.user_name })),
		);
		self.notify(
			ctx,
			"user.created",
			"User",
			&account.id.to_string(),
			serde_json::to_value(&created).unwrap_or_default(),
		);
		Ok(created)
	}

	async fn get_user_inner(&self, ctx: &RequestContext, id: &str) -> Result<ScimUser> {
		ctx.require(ProvisioningScope::UsersRead)?;
		let resolved = self.resolve_user(ctx, id).await?;
		debug!(user_id = %id, "user read");
		Ok(self.to_scim_user(&resolved.account, resolved.external_id()))
	}

	async fn sync_user_groups(&self, ctx: &RequestContext, member: &MemberRef, groups: &[GroupReference]) -> Result<()> {
		let tenant = &ctx.tenant_id;
		for group in groups {
			let Some(mapping) = ctx
				.run(self.group_mappings.get_group_mapping(tenant, &group.value))
				.await?
			else {
				warn!(group_id = %group.value, "skipping unknown group reference");
				continue;
			};
			ctx.run(self.org.add_team_member(tenant, &mapping.team_ref, &member.member_id))
				.await?;
			self.audit(
				ctx,
				AuditLogEntry::builder(AuditEventType::GroupMemberAdded)
					.resource("Group", mapping.scim_id.clone())
					.details(serde_json::json!({ "account_id": member.account_id })),
			);
		}
		Ok(())
	}

	async fn replace_user_inner(&self, ctx: &RequestContext, id: &str, user: ScimUser) -> Result<ScimUser> {
		ctx.require(ProvisioningScope::UsersWrite)?;
		let (user_name, email) = required_identity(&user)?;
		let mut resolved = self.resolve_user(ctx, id).await?;
		let was_active = resolved.account.active;
		let external_changed = resolved.external_id() != user.external_id;
		if external_changed {
			self.check_external_id(ctx, &resolved.account.id, user.external_id.as_deref())
				.await?;
		}

		let name = user.name.clone().unwrap_or_default();
		let account = &mut resolved.account;
		account.email = email;
		account.user_name = user_name;
		account.display_name = user.resolved_display_name();
		account.given_name = name.given_name;
		account.family_name = name.family_name;
		account.active = user.active;
		let updated = ctx.run(self.identity.update_account(account)).await?;

		let external_id = if external_changed {
			self.write_external_id(ctx, &updated.id, resolved.mapping.as_ref(), user.external_id)
				.await?
		} else {
			user.external_id
		};

		let replaced = self.to_scim_user(&updated, external_id);
		self.after_user_update(ctx, &updated, was_active, &replaced);
		Ok(replaced)
	}

	async fn patch_user_inner(&self, ctx: &RequestContext, id: &str, patch: PatchRequest) -> Result<ScimUser> {
		ctx.require(ProvisioningScope::UsersWrite)?;
		patch.validate()?;
		let map = self.attribute_map(ctx).await?;
		let plan = self.patch.plan_user(&patch.operations, &map)?;
		let mut resolved = self.resolve_user(ctx, id).await?;
		let was_active = resolved.account.active;

		let current_external = resolved.external_id();
		let external_changed = matches!(&plan.external_id, Some(next) if *next != current_external);
		if external_changed {
			let next = plan.external_id.as_ref().and_then(|e| e.as_deref());
			self.check_external_id(ctx, &resolved.account.id, next).await?;
		}

		let changed = plan.apply_to(&mut resolved.account);
		if resolved.account.email.trim().is_empty() || resolved.account.user_name.trim().is_empty() {
			return Err(ProvisioningError::invalid_value("userName and email cannot be empty"));
		}
		let account = if changed {
			ctx.run(self.identity.update_account(&resolved.account)).await?
		} else {
			resolved.account.clone()
		};

		let external_id = match plan.external_id {
			Some(next) if external_changed => {
				self.write_external_id(ctx, &account.id, resolved.mapping.as_ref(), next)
					.await?
			}
			_ => current_external,
		};

		let patched = self.to_scim_user(&account, external_id);
		if changed || external_changed {
			self.after_user_update(ctx, &account, was_active, &patched);
		} else {
			debug!(user_id = %id, ignored = plan.ignored, "patch left user unchanged");
		}
		Ok(patched)
	}

	async fn delete_user_inner(&self, ctx: &RequestContext, id: &str) -> Result<()> {
		ctx.require(ProvisioningScope::UsersWrite)?;
		let resolved = self.resolve_user(ctx, id).await?;
		let settings = self.tenant_settings(ctx).await?;
		let tenant = &ctx.tenant_id;
		let account_id = resolved.account.id;

		let event = match settings.delete_mode {
			DeleteMode::Soft => {
				if resolved.account.active {
					let mut account = resolved.account;
					account.active = false;
					ctx.run(self.identity.update_account(&account)).await?;
				}
				info!(account_id = %account_id, "user deactivated");
				AuditEventType::UserDeactivated
			}
			DeleteMode::Hard => {
				ctx.run(self.org.remove_member(tenant, &account_id)).await?;
				ctx.run(self.user_mappings.delete_user_mapping(tenant, &account_id.to_string()))
					.await?;
				ctx.run(self.identity.delete_account(&account_id)).await?;
				info!(account_id = %account_id, "user deleted");
				AuditEventType::UserDeleted
			}
		};

		self.audit(
			ctx,
			AuditLogEntry::builder(event)
				.resource("User", account_id.to_string())
				.details(serde_json::json!({ "delete_mode": settings.delete_mode })),
		);
		let name = if event == AuditEventType::UserDeleted {
			"user.deleted"
		} else {
			"user.deactivated"
		};
		self.notify(ctx, name, "User", &account_id.to_string(), serde_json::Value::Null);
		Ok(())
	}

	async fn list_users_inner(&self, ctx: &RequestContext, query: ListQuery) -> Result<ListResponse<ScimUser>> {
		ctx.require(ProvisioningScope::UsersRead)?;
		let page = self.page(query.start_index, query.count);
		let tenant = &ctx.tenant_id;

		let Some(filter) = self.compile_filter("user", query.filter.as_deref()) else {
			let members = ctx
				.run(self.org.list_members(tenant, page.offset, page.count))
				.await?;
			let users = self.members_to_users(ctx, &members.members).await?;
			return Ok(ListResponse::new(users, members.total, page.start_index));
		};

		let mut matched = Vec::new();
		let mut offset = 0;
		loop {
			ctx.check()?;
			let chunk = ctx.run(self.org.list_members(tenant, offset, SCAN_CHUNK)).await?;
			let fetched = chunk.members.len();
			let users = self.members_to_users(ctx, &chunk.members).await?;
			matched.extend(apply_filter(users, Some(&filter)));
			offset += fetched;
			if fetched < SCAN_CHUNK || offset >= chunk.total {
				break;
			}
		}

		let total = matched.len();
		Ok(ListResponse::new(window(matched, page), total, page.start_index))
	}

	async fn members_to_users(&self, ctx: &RequestContext, members: &[MemberRef]) -> Result<Vec<ScimUser>> {
		let mut users = Vec::with_capacity(members.len());
		for member in members {
			let Some(account) = ctx.run(self.identity.get_account(&member.account_id)).await? else {
				warn!(account_id = %member.account_id, "member without account, skipping");
				continue;
			};
			let mapping = ctx
				.run(
					self.user_mappings
						.get_user_mapping(&ctx.tenant_id, &account.id.to_string()),
				)
				.await?;
			users.push(self.to_scim_user(&account, mapping.and_then(|m| m.external_id)));
		}
		Ok(users)
	}

	/// Looks up an account that is a member of the calling tenant. Accounts
	/// outside the tenant are reported as absent.
	async fn resolve_user(&self, ctx: &RequestContext, id: &str) -> Result<ResolvedUser> {
		let not_found = || ProvisioningError::NotFound(format!("user {id}"));
		let account_id: AccountId = id.parse().map_err(|_| not_found())?;
		let account = ctx
			.run(self.identity.get_account(&account_id))
			.await?
			.ok_or_else(not_found)?;
		if !ctx.run(self.org.is_member(&ctx.tenant_id, &account_id)).await? {
			return Err(not_found());
		}
		let mapping = ctx
			.run(self.user_mappings.get_user_mapping(&ctx.tenant_id, &account_id.to_string()))
			.await?;
		Ok(ResolvedUser { account, mapping })
	}

	/// Rejects an external id already held by another account.
	async fn check_external_id(
		&self,
		ctx: &RequestContext,
		account_id: &AccountId,
		external_id: Option<&str>,
	) -> Result<()> {
		let Some(next) = external_id else {
			return Ok(());
		};
		let holder = ctx
			.run(self.user_mappings.get_user_mapping_by_external_id(&ctx.tenant_id, next))
			.await?;
		match holder {
			Some(holder) if holder.account_id != account_id.to_string() => Err(
				ProvisioningError::Conflict(format!("externalId {next} belongs to another user")),
			),
			_ => Ok(()),
		}
	}

	/// Writes the external id mapping. Callers run `check_external_id` first.
	async fn write_external_id(
		&self,
		ctx: &RequestContext,
		account_id: &AccountId,
		current: Option<&UserMapping>,
		external_id: Option<String>,
	) -> Result<Option<String>> {
		let now = Utc::now();
		ctx.run(self.user_mappings.upsert_user_mapping(&UserMapping {
			tenant_id: ctx.tenant_id,
			account_id: account_id.to_string(),
			external_id: external_id.clone(),
			created_at: current.map(|m| m.created_at).unwrap_or(now),
			updated_at: now,
		}))
		.await?;
		Ok(external_id)
	}

	fn after_user_update(&self, ctx: &RequestContext, account: &Account, was_active: bool, user: &ScimUser) {
		let deactivated = was_active && !account.active;
		let (event, name) = if deactivated {
			(AuditEventType::UserDeactivated, "user.deactivated")
		} else {
			(AuditEventType::UserUpdated, "user.updated")
		};
		info!(account_id = %account.id, active = account.active, "user updated");
		self.audit(
			ctx,
			AuditLogEntry::builder(event).resource("User", account.id.to_string()),
		);
		self.notify(
			ctx,
			name,
			"User",
			&account.id.to_string(),
			serde_json::to_value(user).unwrap_or_default(),
		);
	}

	pub(crate) fn to_scim_user(&self, account: &Account, external_id: Option<String>) -> ScimUser {
		let id = account.id.to_string();
		let name = (account.given_name.is_some() || account.family_name.is_some()).then(|| Name {
			formatted: None,
			given_name: account.given_name.clone(),
			family_name: account.family_name.clone(),
		});

		let mut user = ScimUser::new(account.user_name.clone());
		user.external_id = external_id;
		user.display_name = account.display_name.clone();
		user.name = name;
		user.active = account.active;
		user.emails = vec![ScimEmail::work(account.email.clone())];
		user.meta = Some(Meta::new(
			"User",
			account.created_at,
			account.updated_at,
			Some(self.user_location(&id)),
		));
		user.id = Some(id);
		user
	}
}

fn required_identity(user: &ScimUser) -> Result<(String, String)> {
	let user_name = user.user_name.trim();
	if user_name.is_empty() {
		return Err(ProvisioningError::invalid_value("userName is required"));
	}
	let email = user
		.canonical_email()
		.ok_or_else(|| ProvisioningError::invalid_value("an email address is required"))?;
	Ok((user_name.to_string(), email.trim().to_string()))
}
