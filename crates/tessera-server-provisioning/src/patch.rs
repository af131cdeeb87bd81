// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns patch operations into field updates and membership changes.
//!
//! Planning is pure: a patch is reduced to a plan first, then the plan is
//! applied. Operations later in a request override earlier ones touching the
//! same field. Paths the engine does not understand are accepted and skipped,
//! but each one is counted and logged.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tessera_scim::filter::normalize_path;
use tessera_scim::{PatchOp, PatchOperation};
use tracing::{debug, warn};

use crate::attribute_map::{AccountField, AttributeMap};
use crate::context::RequestContext;
use crate::error::{ProvisioningError, Result};
use crate::identity::Account;
use crate::metrics::ProvisioningMetrics;
use crate::org_adapter::OrgAdapter;
use tessera_server_auth::AccountId;

/// Field updates for one account. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatchPlan {
	pub email: Option<String>,
	pub user_name: Option<String>,
	pub display_name: Option<Option<String>>,
	pub given_name: Option<Option<String>>,
	pub family_name: Option<Option<String>>,
	pub active: Option<bool>,
	pub external_id: Option<Option<String>>,
	pub ignored: usize,
}

impl UserPatchPlan {
	/// Applies the account fields. Returns whether anything changed.
	pub fn apply_to(&self, account: &mut Account) -> bool {
		let mut changed = false;
		if let Some(email) = &self.email {
			changed |= set(&mut account.email, email.clone());
		}
		if let Some(user_name) = &self.user_name {
			changed |= set(&mut account.user_name, user_name.clone());
		}
		if let Some(display_name) = &self.display_name {
			changed |= set(&mut account.display_name, display_name.clone());
		}
		if let Some(given_name) = &self.given_name {
			changed |= set(&mut account.given_name, given_name.clone());
		}
		if let Some(family_name) = &self.family_name {
			changed |= set(&mut account.family_name, family_name.clone());
		}
		if let Some(active) = self.active {
			changed |= set(&mut account.active, active);
		}
		changed
	}
}

fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
	if *slot == value {
		return false;
	}
	*slot = value;
	true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberChange {
	Add(Vec<String>),
	Remove(Vec<String>),
	RemoveAll,
	Replace(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPatchPlan {
	pub display_name: Option<String>,
	pub external_id: Option<Option<String>>,
	pub member_changes: Vec<MemberChange>,
	pub ignored: usize,
}

/// Team membership changes actually applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
	pub added: Vec<AccountId>,
	pub removed: Vec<AccountId>,
	pub skipped: usize,
}

impl MembershipDelta {
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}
}

pub struct PatchEngine {
	metrics: Arc<ProvisioningMetrics>,
}

impl PatchEngine {
	pub fn new(metrics: Arc<ProvisioningMetrics>) -> Self {
		Self { metrics }
	}

	pub fn plan_user(&self, operations: &[PatchOperation], map: &AttributeMap) -> Result<UserPatchPlan> {
		let mut plan = UserPatchPlan::default();
		for operation in operations {
			for (path, value) in expand(operation)? {
				match map.resolve(&path) {
					Some(field) => {
						if !apply_user_field(&mut plan, operation.op, field, value)? {
							self.ignore(&mut plan.ignored, "user", operation.op, &path);
						}
					}
					None => self.ignore(&mut plan.ignored, "user", operation.op, &path),
				}
			}
		}
		Ok(plan)
	}

	pub fn plan_group(&self, operations: &[PatchOperation]) -> Result<GroupPatchPlan> {
		let mut plan = GroupPatchPlan::default();
		for operation in operations {
			for (path, value) in expand(operation)? {
				if !apply_group_path(&mut plan, operation.op, &path, value)? {
					self.ignore(&mut plan.ignored, "group", operation.op, &path);
				}
			}
		}
		Ok(plan)
	}

	/// Applies member changes to a team. Member values are account ids;
	/// accounts that are not tenant members are skipped.
	pub async fn apply_membership(
		&self,
		ctx: &RequestContext,
		adapter: &dyn OrgAdapter,
		team_id: &str,
		changes: &[MemberChange],
	) -> Result<MembershipDelta> {
		let tenant = &ctx.tenant_id;
		let mut delta = MembershipDelta::default();

		for change in changes {
			match change {
				MemberChange::Add(values) => {
					for (account, member_id) in self.resolve_members(ctx, adapter, values, &mut delta).await? {
						ctx.run(adapter.add_team_member(tenant, team_id, &member_id))
							.await?;
						delta.added.push(account);
					}
				}
				MemberChange::Remove(values) => {
					for (account, member_id) in self.resolve_members(ctx, adapter, values, &mut delta).await? {
						ctx.run(adapter.remove_team_member(tenant, team_id, &member_id))
							.await?;
						delta.removed.push(account);
					}
				}
				MemberChange::RemoveAll => {
					for member in ctx.run(adapter.list_team_members(tenant, team_id)).await? {
						ctx.run(adapter.remove_team_member(tenant, team_id, &member.member_id))
							.await?;
						delta.removed.push(member.account_id);
					}
				}
				MemberChange::Replace(values) => {
					let desired = self.resolve_members(ctx, adapter, values, &mut delta).await?;
					let current = ctx.run(adapter.list_team_members(tenant, team_id)).await?;
					let wanted: BTreeSet<&str> = desired.iter().map(|(_, m)| m.as_str()).collect();
					let present: BTreeSet<&str> =
						current.iter().map(|m| m.member_id.as_str()).collect();

					for member in current.iter().filter(|m| !wanted.contains(m.member_id.as_str())) {
						ctx.run(adapter.remove_team_member(tenant, team_id, &member.member_id))
							.await?;
						delta.removed.push(member.account_id);
					}
					for (account, member_id) in desired.iter().filter(|(_, m)| !present.contains(m.as_str())) {
						ctx.run(adapter.add_team_member(tenant, team_id, member_id))
							.await?;
						delta.added.push(*account);
					}
				}
			}
		}

		Ok(delta)
	}

	async fn resolve_members(
		&self,
		ctx: &RequestContext,
		adapter: &dyn OrgAdapter,
		values: &[String],
		delta: &mut MembershipDelta,
	) -> Result<Vec<(AccountId, String)>> {
		let mut resolved = Vec::with_capacity(values.len());
		for value in values {
			let Ok(account) = value.parse::<AccountId>() else {
				warn!(member = %value, "skipping malformed member reference");
				delta.skipped += 1;
				continue;
			};
			match ctx.run(adapter.resolve_member_id(&ctx.tenant_id, &account)).await? {
				Some(member_id) => resolved.push((account, member_id)),
				None => {
					warn!(member = %value, "skipping member reference to unknown account");
					delta.skipped += 1;
				}
			}
		}
		Ok(resolved)
	}

	fn ignore(&self, ignored: &mut usize, resource: &str, op: PatchOp, path: &str) {
		*ignored += 1;
		self.metrics.record_patch_ignored(resource, &op.to_string());
		warn!(resource, op = %op, path, "ignoring unsupported patch path");
	}
}

/// Splits an operation into (path, value) pairs. Path-less add and replace
/// carry an object whose keys are paths.
fn expand(operation: &PatchOperation) -> Result<Vec<(String, Option<Value>)>> {
	match operation.path.as_deref().map(str::trim) {
		Some(path) if !path.is_empty() => Ok(vec![(path.to_string(), operation.value.clone())]),
		_ => match &operation.value {
			Some(Value::Object(_)) => {
				let mut pairs = Vec::new();
				flatten("", operation.value.as_ref(), &mut pairs);
				Ok(pairs)
			}
			_ => Err(ProvisioningError::invalid_value(format!(
				"{} without a path requires an object value",
				operation.op
			))),
		},
	}
}

fn flatten(prefix: &str, value: Option<&Value>, out: &mut Vec<(String, Option<Value>)>) {
	let Some(Value::Object(fields)) = value else {
		out.push((prefix.to_string(), value.cloned()));
		return;
	};
	// Attributes inside a schema extension container are addressed with ':'.
	let separator = if is_schema_urn(prefix) { ':' } else { '.' };
	for (key, child) in fields {
		let path = if prefix.is_empty() {
			key.clone()
		} else {
			format!("{prefix}{separator}{key}")
		};
		// Only urn containers and `name` are descended into; other objects
		// are mapped as a whole.
		if child.is_object() && (is_schema_urn(key) || key.eq_ignore_ascii_case("name")) {
			flatten(&path, Some(child), out);
		} else {
			out.push((path, Some(child.clone())));
		}
	}
}

/// A bare schema URN such as `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User`.
fn is_schema_urn(s: &str) -> bool {
	s.starts_with("urn:")
		&& s
			.rsplit(':')
			.next()
			.and_then(|last| last.chars().next())
			.is_some_and(|c| c.is_ascii_uppercase())
}

/// Returns false when the (op, field) pair is not supported.
fn apply_user_field(
	plan: &mut UserPatchPlan,
	op: PatchOp,
	field: AccountField,
	value: Option<Value>,
) -> Result<bool> {
	if op == PatchOp::Remove {
		if field.is_required() {
			return Ok(false);
		}
		match field {
			AccountField::DisplayName => plan.display_name = Some(None),
			AccountField::GivenName => plan.given_name = Some(None),
			AccountField::FamilyName => plan.family_name = Some(None),
			AccountField::ExternalId => plan.external_id = Some(None),
			_ => return Ok(false),
		}
		return Ok(true);
	}

	let value = value.ok_or_else(|| {
		ProvisioningError::invalid_value(format!("{op} on '{field}' requires a value"))
	})?;

	match field {
		AccountField::Active => plan.active = Some(parse_bool(&value)?),
		AccountField::Email => plan.email = Some(required(field, email_value(&value)?)?),
		AccountField::UserName => plan.user_name = Some(required(field, string_value(field, &value)?)?),
		AccountField::DisplayName => plan.display_name = Some(optional(field, &value)?),
		AccountField::GivenName => plan.given_name = Some(optional(field, &value)?),
		AccountField::FamilyName => plan.family_name = Some(optional(field, &value)?),
		AccountField::ExternalId => plan.external_id = Some(optional(field, &value)?),
	}
	Ok(true)
}

fn apply_group_path(plan: &mut GroupPatchPlan, op: PatchOp, path: &str, value: Option<Value>) -> Result<bool> {
	let normalized = normalize_path(path);

	if let Some(member) = member_filter_value(&normalized, path) {
		return Ok(match op {
			PatchOp::Remove => {
				plan.member_changes.push(MemberChange::Remove(vec![member]));
				true
			}
			_ => false,
		});
	}

	match (normalized.as_str(), op) {
		("displayname", PatchOp::Add | PatchOp::Replace) => {
			let name = value
				.as_ref()
				.and_then(Value::as_str)
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.ok_or_else(|| ProvisioningError::invalid_value("displayName must be a non-empty string"))?;
			plan.display_name = Some(name.to_string());
			Ok(true)
		}
		("externalid", PatchOp::Add | PatchOp::Replace) => {
			let value = value.unwrap_or(Value::Null);
			plan.external_id = Some(optional(AccountField::ExternalId, &value)?);
			Ok(true)
		}
		("externalid", PatchOp::Remove) => {
			plan.external_id = Some(None);
			Ok(true)
		}
		("members", PatchOp::Add) => {
			plan.member_changes.push(MemberChange::Add(member_values(value)?));
			Ok(true)
		}
		("members", PatchOp::Replace) => {
			plan.member_changes.push(MemberChange::Replace(member_values(value)?));
			Ok(true)
		}
		("members", PatchOp::Remove) => {
			let change = match value {
				None | Some(Value::Null) => MemberChange::RemoveAll,
				Some(v) => MemberChange::Remove(member_values(Some(v))?),
			};
			plan.member_changes.push(change);
			Ok(true)
		}
		_ => Ok(false),
	}
}

/// `members[value eq "id"]` yields `id`, preserving the original case.
fn member_filter_value(normalized: &str, original: &str) -> Option<String> {
	if !normalized.starts_with("members[") || !normalized.ends_with(']') {
		return None;
	}
	let start = original.find('[')? + 1;
	let end = original.rfind(']')?;
	let inner: Vec<&str> = original.get(start..end)?.split_whitespace().collect();
	match inner.as_slice() {
		[attr, op, value] if attr.eq_ignore_ascii_case("value") && op.eq_ignore_ascii_case("eq") => {
			Some(value.trim_matches('"').to_string())
		}
		_ => None,
	}
}

fn member_values(value: Option<Value>) -> Result<Vec<String>> {
	let items = match value {
		Some(Value::Array(items)) => items,
		Some(item @ Value::Object(_)) => vec![item],
		_ => {
			return Err(ProvisioningError::invalid_value(
				"members must be an array of member objects",
			));
		}
	};
	items
		.iter()
		.map(|item| {
			item.get("value")
				.and_then(Value::as_str)
				.map(str::to_string)
				.ok_or_else(|| ProvisioningError::invalid_value("member entries require a string value"))
		})
		.collect()
}

/// Accepts JSON booleans and the strings "true"/"false" in any case.
fn parse_bool(value: &Value) -> Result<bool> {
	match value {
		Value::Bool(b) => Ok(*b),
		Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
		Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
		other => Err(ProvisioningError::invalid_value(format!(
			"active must be a boolean, got {other}"
		))),
	}
}

fn string_value(field: AccountField, value: &Value) -> Result<String> {
	value
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| ProvisioningError::invalid_value(format!("{field} must be a string")))
}

fn required(field: AccountField, value: String) -> Result<String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return Err(ProvisioningError::invalid_value(format!("{field} must not be empty")));
	}
	Ok(trimmed.to_string())
}

/// Null or empty clears the field.
fn optional(field: AccountField, value: &Value) -> Result<Option<String>> {
	match value {
		Value::Null => Ok(None),
		Value::String(s) if s.trim().is_empty() => Ok(None),
		Value::String(s) => Ok(Some(s.clone())),
		_ => Err(ProvisioningError::invalid_value(format!("{field} must be a string"))),
	}
}

/// An address from a string, an email object, or an array of them
/// (primary entry first, then the first entry).
fn email_value(value: &Value) -> Result<String> {
	let pick = match value {
		Value::String(s) => Some(s.as_str()),
		Value::Object(_) => value.get("value").and_then(Value::as_str),
		Value::Array(items) => items
			.iter()
			.find(|e| e.get("primary").and_then(Value::as_bool).unwrap_or(false))
			.or_else(|| items.first())
			.and_then(|e| e.get("value").and_then(Value::as_str)),
		_ => None,
	};
	let email = pick.ok_or_else(|| ProvisioningError::invalid_value("email value is not an address"))?;
	debug!(email, "resolved email from patch value");
	Ok(email.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::org_adapter::{InMemoryOrgBackend, OrganizationOrgAdapter};
	use chrono::Utc;
	use serde_json::json;
	use tessera_server_auth::TenantId;

	fn engine() -> PatchEngine {
		PatchEngine::new(Arc::new(ProvisioningMetrics::new().unwrap()))
	}

	fn op(op: PatchOp, path: Option<&str>, value: Option<Value>) -> PatchOperation {
		PatchOperation::new(op, path, value)
	}

	fn account() -> Account {
		let now = Utc::now();
		Account {
			id: AccountId::generate(),
			email: "ada@example.com".to_string(),
			user_name: "ada".to_string(),
			display_name: Some("Ada".to_string()),
			given_name: None,
			family_name: None,
			active: true,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn active_replace_is_idempotent() {
		let engine = engine();
		let ops = [op(PatchOp::Replace, Some("active"), Some(json!("False")))];
		let plan = engine.plan_user(&ops, &AttributeMap::defaults()).unwrap();

		let mut once = account();
		assert!(plan.apply_to(&mut once));
		let mut twice = once.clone();
		assert!(!plan.apply_to(&mut twice));
		assert_eq!(once, twice);
		assert!(!twice.active);
	}

	#[test]
	fn pathless_replace_flattens_object() {
		let ops = [op(
			PatchOp::Replace,
			None,
			Some(json!({
				"displayName": "Ada Lovelace",
				"name": {"givenName": "Ada", "familyName": "Lovelace"},
				"active": true
			})),
		)];
		let plan = engine().plan_user(&ops, &AttributeMap::defaults()).unwrap();
		assert_eq!(plan.display_name, Some(Some("Ada Lovelace".to_string())));
		assert_eq!(plan.given_name, Some(Some("Ada".to_string())));
		assert_eq!(plan.family_name, Some(Some("Lovelace".to_string())));
		assert_eq!(plan.active, Some(true));
		assert_eq!(plan.ignored, 0);
	}

	#[test]
	fn pathless_replace_descends_into_schema_containers() {
		let ops = [op(
			PatchOp::Replace,
			None,
			Some(json!({
				"urn:ietf:params:scim:schemas:core:2.0:User": {
					"name": {"givenName": "Grace"}
				},
				"urn:ietf:params:scim:schemas:extension:enterprise:2.0:User": {
					"department": "R&D"
				}
			})),
		)];
		let plan = engine().plan_user(&ops, &AttributeMap::defaults()).unwrap();
		assert_eq!(plan.given_name, Some(Some("Grace".to_string())));
		assert_eq!(plan.ignored, 1);
	}

	#[test]
	fn email_selectors_set_canonical_email() {
		let map = AttributeMap::defaults();
		let work = engine()
			.plan_user(
				&[op(
					PatchOp::Replace,
					Some("emails[type eq \"work\"].value"),
					Some(json!("ada@work.example")),
				)],
				&map,
			)
			.unwrap();
		assert_eq!(work.email.as_deref(), Some("ada@work.example"));

		let array = engine()
			.plan_user(
				&[op(
					PatchOp::Replace,
					Some("emails"),
					Some(json!([
						{"value": "home@example.com"},
						{"value": "primary@example.com", "primary": true}
					])),
				)],
				&map,
			)
			.unwrap();
		assert_eq!(array.email.as_deref(), Some("primary@example.com"));
	}

	#[test]
	fn unknown_paths_are_ignored_and_counted() {
		let ops = [
			op(PatchOp::Replace, Some("title"), Some(json!("Engineer"))),
			op(PatchOp::Remove, Some("active"), None),
			op(PatchOp::Replace, Some("displayName"), Some(json!("Ada"))),
		];
		let plan = engine().plan_user(&ops, &AttributeMap::defaults()).unwrap();
		assert_eq!(plan.ignored, 2);
		assert_eq!(plan.display_name, Some(Some("Ada".to_string())));
		assert!(plan.active.is_none());
	}

	#[test]
	fn later_operations_win() {
		let ops = [
			op(PatchOp::Replace, Some("active"), Some(json!(false))),
			op(PatchOp::Replace, Some("active"), Some(json!(true))),
		];
		let plan = engine().plan_user(&ops, &AttributeMap::defaults()).unwrap();
		assert_eq!(plan.active, Some(true));
	}

	#[test]
	fn invalid_active_value_is_rejected() {
		let ops = [op(PatchOp::Replace, Some("active"), Some(json!("maybe")))];
		let err = engine().plan_user(&ops, &AttributeMap::defaults()).unwrap_err();
		assert_eq!(err.status_code(), 400);
	}

	#[test]
	fn remove_clears_optional_fields() {
		let ops = [op(PatchOp::Remove, Some("displayName"), None)];
		let plan = engine().plan_user(&ops, &AttributeMap::defaults()).unwrap();
		let mut acct = account();
		assert!(plan.apply_to(&mut acct));
		assert!(acct.display_name.is_none());
	}

	#[test]
	fn group_plan_reads_member_operations() {
		let ops = [
			op(PatchOp::Add, Some("members"), Some(json!([{"value": "a"}, {"value": "b"}]))),
			op(PatchOp::Remove, Some("members[value eq \"C-Upper\"]"), None),
			op(PatchOp::Replace, Some("displayName"), Some(json!("Platform"))),
			op(PatchOp::Add, Some("description"), Some(json!("ignored"))),
		];
		let plan = engine().plan_group(&ops).unwrap();
		assert_eq!(plan.display_name.as_deref(), Some("Platform"));
		assert_eq!(
			plan.member_changes,
			vec![
				MemberChange::Add(vec!["a".to_string(), "b".to_string()]),
				MemberChange::Remove(vec!["C-Upper".to_string()]),
			]
		);
		assert_eq!(plan.ignored, 1);
	}

	#[test]
	fn remove_members_without_value_removes_all() {
		let plan = engine()
			.plan_group(&[op(PatchOp::Remove, Some("members"), None)])
			.unwrap();
		assert_eq!(plan.member_changes, vec![MemberChange::RemoveAll]);
	}

	#[tokio::test]
	async fn membership_changes_are_idempotent() {
		let adapter = OrganizationOrgAdapter::new(Arc::new(InMemoryOrgBackend::new()));
		let tenant = TenantId::generate();
		let ctx = RequestContext::system(tenant);
		let alice = AccountId::generate();
		let bob = AccountId::generate();
		adapter.add_member(&tenant, &alice).await.unwrap();
		adapter.add_member(&tenant, &bob).await.unwrap();
		let team = adapter.create_team(&tenant, "Eng").await.unwrap();
		let engine = engine();

		let add = [MemberChange::Add(vec![alice.to_string(), bob.to_string()])];
		engine.apply_membership(&ctx, &adapter, &team.team_id, &add).await.unwrap();
		engine.apply_membership(&ctx, &adapter, &team.team_id, &add).await.unwrap();
		assert_eq!(adapter.list_team_members(&tenant, &team.team_id).await.unwrap().len(), 2);

		let replace = [MemberChange::Replace(vec![bob.to_string()])];
		let delta = engine
			.apply_membership(&ctx, &adapter, &team.team_id, &replace)
			.await
			.unwrap();
		assert_eq!(delta.removed, vec![alice]);
		assert!(delta.added.is_empty());

		let members = adapter.list_team_members(&tenant, &team.team_id).await.unwrap();
		assert_eq!(members.len(), 1);
		assert_eq!(members[0].account_id, bob);
	}

	#[tokio::test]
	async fn unknown_members_are_skipped() {
		let adapter = OrganizationOrgAdapter::new(Arc::new(InMemoryOrgBackend::new()));
		let tenant = TenantId::generate();
		let ctx = RequestContext::system(tenant);
		let team = adapter.create_team(&tenant, "Eng").await.unwrap();

		let changes = [MemberChange::Add(vec![
			"not-a-uuid".to_string(),
			AccountId::generate().to_string(),
		])];
		let delta = engine()
			.apply_membership(&ctx, &adapter, &team.team_id, &changes)
			.await
			.unwrap();
		assert_eq!(delta.skipped, 2);
		assert!(delta.is_empty());
	}
}
