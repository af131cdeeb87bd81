// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sequential execution of bulk requests.
//!
//! Sub-operations run strictly in request order. Each is parsed into a
//! [`BulkAction`] before dispatch, and every outcome (success or failure)
//! becomes one response entry. Processing stops once the failure count
//! reaches `failOnErrors`; work already done is not rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tessera_scim::{
	BulkMethod, BulkOperationRequest, BulkOperationResponse, BulkRequest, BulkResponse, PatchRequest,
	ScimError, ScimGroup, ScimUser,
};
use tessera_server_auth::ProvisioningScope;
use tracing::{debug, instrument, warn};

use crate::context::RequestContext;
use crate::error::{ProvisioningError, Result};
use crate::metrics::ProvisioningMetrics;

const BULK_ID_PREFIX: &str = "bulkId:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
	User,
	Group,
}

impl ResourceKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceKind::User => "User",
			ResourceKind::Group => "Group",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ResourcePath {
	Collection(ResourceKind),
	Item(ResourceKind, String),
}

fn parse_path(path: &str) -> Result<ResourcePath> {
	let trimmed = path.trim().trim_start_matches('/');
	let mut segments = trimmed.split('/');
	let kind = match segments.next() {
		Some(s) if s.eq_ignore_ascii_case("Users") => ResourceKind::User,
		Some(s) if s.eq_ignore_ascii_case("Groups") => ResourceKind::Group,
		_ => return Err(ProvisioningError::invalid_path(format!("unsupported bulk path '{path}'"))),
	};
	match (segments.next(), segments.next()) {
		(None, _) => Ok(ResourcePath::Collection(kind)),
		(Some(id), None) if !id.is_empty() => Ok(ResourcePath::Item(kind, id.to_string())),
		_ => Err(ProvisioningError::invalid_path(format!("unsupported bulk path '{path}'"))),
	}
}

/// One supported bulk sub-operation with its payload already decoded.
#[derive(Debug, Clone)]
pub enum BulkAction {
	CreateUser(ScimUser),
	ReplaceUser { id: String, user: ScimUser },
	PatchUser { id: String, patch: PatchRequest },
	DeleteUser { id: String },
	CreateGroup(ScimGroup),
	ReplaceGroup { id: String, group: ScimGroup },
	PatchGroup { id: String, patch: PatchRequest },
	DeleteGroup { id: String },
}

impl BulkAction {
	pub fn parse(method: BulkMethod, path: &str, data: Option<Value>) -> Result<Self> {
		use ResourceKind::{Group, User};
		use ResourcePath::{Collection, Item};

		let action = match (method, parse_path(path)?) {
			(BulkMethod::Post, Collection(User)) => BulkAction::CreateUser(decode(method, data)?),
			(BulkMethod::Put, Item(User, id)) => BulkAction::ReplaceUser {
				id,
				user: decode(method, data)?,
			},
			(BulkMethod::Patch, Item(User, id)) => BulkAction::PatchUser {
				id,
				patch: decode(method, data)?,
			},
			(BulkMethod::Delete, Item(User, id)) => BulkAction::DeleteUser { id },
			(BulkMethod::Post, Collection(Group)) => BulkAction::CreateGroup(decode(method, data)?),
			(BulkMethod::Put, Item(Group, id)) => BulkAction::ReplaceGroup {
				id,
				group: decode(method, data)?,
			},
			(BulkMethod::Patch, Item(Group, id)) => BulkAction::PatchGroup {
				id,
				patch: decode(method, data)?,
			},
			(BulkMethod::Delete, Item(Group, id)) => BulkAction::DeleteGroup { id },
			(method, _) => {
				return Err(ProvisioningError::invalid_syntax(format!(
					"{method} is not supported on '{path}'"
				)));
			}
		};
		Ok(action)
	}

	pub fn kind(&self) -> ResourceKind {
		match self {
			BulkAction::CreateUser(_)
			| BulkAction::ReplaceUser { .. }
			| BulkAction::PatchUser { .. }
			| BulkAction::DeleteUser { .. } => ResourceKind::User,
			BulkAction::CreateGroup(_)
			| BulkAction::ReplaceGroup { .. }
			| BulkAction::PatchGroup { .. }
			| BulkAction::DeleteGroup { .. } => ResourceKind::Group,
		}
	}
}

fn decode<T: serde::de::DeserializeOwned>(method: BulkMethod, data: Option<Value>) -> Result<T> {
	let data = data.ok_or_else(|| ProvisioningError::invalid_syntax(format!("{method} requires data")))?;
	serde_json::from_value(data).map_err(|e| ProvisioningError::invalid_syntax(format!("invalid data: {e}")))
}

/// Result of one successfully executed action.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
	pub status: u16,
	pub resource_id: Option<String>,
	pub location: Option<String>,
	pub body: Option<Value>,
}

/// Executes single-resource actions on behalf of the coordinator.
#[async_trait]
pub trait BulkTarget: Send + Sync {
	async fn execute(&self, ctx: &RequestContext, action: BulkAction) -> Result<BulkOutcome>;
}

pub struct BulkCoordinator {
	max_operations: usize,
	max_payload_bytes: usize,
	metrics: Arc<ProvisioningMetrics>,
}

impl BulkCoordinator {
	pub fn new(max_operations: usize, max_payload_bytes: usize, metrics: Arc<ProvisioningMetrics>) -> Self {
		Self {
			max_operations,
			max_payload_bytes,
			metrics,
		}
	}

	pub fn max_operations(&self) -> usize {
		self.max_operations
	}

	pub fn max_payload_bytes(&self) -> usize {
		self.max_payload_bytes
	}

	/// Rejects a payload before it is decoded.
	pub fn check_payload_size(&self, payload_bytes: usize) -> Result<()> {
		if payload_bytes > self.max_payload_bytes {
			return Err(ProvisioningError::PayloadTooLarge(format!(
				"bulk payload of {payload_bytes} bytes exceeds {}",
				self.max_payload_bytes
			)));
		}
		Ok(())
	}

	/// Only batch-level problems are returned as errors; per-operation
	/// failures become response entries.
	#[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, operations = request.operations.len()))]
	pub async fn process(
		&self,
		ctx: &RequestContext,
		target: &dyn BulkTarget,
		request: BulkRequest,
		payload_bytes: usize,
	) -> Result<BulkResponse> {
		ctx.require(ProvisioningScope::Bulk)?;
		self.check_payload_size(payload_bytes)?;
		if request.operations.len() > self.max_operations {
			return Err(ScimError::TooMany {
				count: request.operations.len(),
				max: self.max_operations,
			}
			.into());
		}
		check_unique_bulk_ids(&request.operations)?;

		let threshold = request.fail_on_errors.filter(|n| *n > 0);
		let mut resolved: HashMap<String, String> = HashMap::new();
		let mut responses = Vec::with_capacity(request.operations.len());
		let mut failures = 0usize;

		for operation in request.operations {
			ctx.check()?;

			let method = operation.method;
			let bulk_id = operation.bulk_id.clone();
			match self.run_one(ctx, target, operation, &resolved).await {
				Ok(outcome) => {
					self.metrics.record_bulk_operation("success");
					if let (Some(bulk_id), Some(id)) = (&bulk_id, &outcome.resource_id) {
						resolved.insert(bulk_id.clone(), id.clone());
					}
					responses.push(BulkOperationResponse {
						method,
						bulk_id,
						location: outcome.location,
						status: outcome.status.to_string(),
						response: outcome.body,
					});
				}
				Err(ProvisioningError::Cancelled) => return Err(ProvisioningError::Cancelled),
				Err(e) => {
					failures += 1;
					self.metrics.record_bulk_operation("failure");
					debug!(method = %method, bulk_id = ?bulk_id, error = %e, "bulk operation failed");
					responses.push(BulkOperationResponse {
						method,
						bulk_id,
						location: None,
						status: e.status_code().to_string(),
						response: serde_json::to_value(e.to_scim_response()).ok(),
					});

					if threshold.is_some_and(|n| failures >= n) {
						warn!(failures, "bulk failure threshold reached, stopping");
						break;
					}
				}
			}
		}

		Ok(BulkResponse::new(responses))
	}

	async fn run_one(
		&self,
		ctx: &RequestContext,
		target: &dyn BulkTarget,
		operation: BulkOperationRequest,
		resolved: &HashMap<String, String>,
	) -> Result<BulkOutcome> {
		let path = resolve_path(&operation.path, resolved)?;
		let data = match operation.data {
			Some(mut data) => {
				resolve_refs(&mut data, resolved)?;
				Some(data)
			}
			None => None,
		};
		let action = BulkAction::parse(operation.method, &path, data)?;
		target.execute(ctx, action).await
	}
}

fn check_unique_bulk_ids(operations: &[BulkOperationRequest]) -> Result<()> {
	let mut seen = HashSet::new();
	for id in operations.iter().filter_map(|op| op.bulk_id.as_deref()) {
		if !seen.insert(id) {
			return Err(ProvisioningError::invalid_syntax(format!("duplicate bulkId '{id}'")));
		}
	}
	Ok(())
}

fn unresolved(bulk_id: &str) -> ProvisioningError {
	ProvisioningError::invalid_value(format!("unresolved reference 'bulkId:{bulk_id}'"))
}

/// Substitutes a `bulkId:` reference in the id segment of a path.
fn resolve_path(path: &str, resolved: &HashMap<String, String>) -> Result<String> {
	let Some((collection, id)) = path.rsplit_once('/') else {
		return Ok(path.to_string());
	};
	match id.strip_prefix(BULK_ID_PREFIX) {
		Some(bulk_id) => resolved
			.get(bulk_id)
			.map(|real| format!("{collection}/{real}"))
			.ok_or_else(|| unresolved(bulk_id)),
		None => Ok(path.to_string()),
	}
}

/// Replaces every `"bulkId:<id>"` string in `value` with the resource id it
/// names.
fn resolve_refs(value: &mut Value, resolved: &HashMap<String, String>) -> Result<()> {
	match value {
		Value::String(s) => {
			if let Some(bulk_id) = s.strip_prefix(BULK_ID_PREFIX) {
				let real = resolved.get(bulk_id).ok_or_else(|| unresolved(bulk_id))?;
				*s = real.clone();
			}
		}
		Value::Array(items) => {
			for item in items {
				resolve_refs(item, resolved)?;
			}
		}
		Value::Object(fields) => {
			for (_, field) in fields {
				resolve_refs(field, resolved)?;
			}
		}
		_ => {}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use serde_json::json;
	use tessera_server_auth::TenantId;
	use tokio_util::sync::CancellationToken;

	/// Creates users named by `userName`; any user named "fail" is rejected.
	#[derive(Default)]
	struct FakeTarget {
		executed: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl BulkTarget for FakeTarget {
		async fn execute(&self, _ctx: &RequestContext, action: BulkAction) -> Result<BulkOutcome> {
			match action {
				BulkAction::CreateUser(user) => {
					self.executed.lock().push(user.user_name.clone());
					if user.user_name == "fail" {
						return Err(ProvisioningError::Conflict("duplicate".to_string()));
					}
					let id = format!("id-{}", user.user_name);
					Ok(BulkOutcome {
						status: 201,
						location: Some(format!("/Users/{id}")),
						resource_id: Some(id),
						body: None,
					})
				}
				BulkAction::CreateGroup(group) => {
					let members: Vec<String> = group.members.iter().map(|m| m.value.clone()).collect();
					self.executed.lock().push(format!("group:{}", members.join(",")));
					Ok(BulkOutcome {
						status: 201,
						resource_id: Some("g-1".to_string()),
						location: None,
						body: None,
					})
				}
				BulkAction::DeleteUser { id } => {
					self.executed.lock().push(format!("delete:{id}"));
					Ok(BulkOutcome {
						status: 204,
						resource_id: None,
						location: None,
						body: None,
					})
				}
				other => Err(ProvisioningError::invalid_syntax(format!("unexpected {other:?}"))),
			}
		}
	}

	fn coordinator() -> BulkCoordinator {
		BulkCoordinator::new(1000, 1 << 20, Arc::new(ProvisioningMetrics::new().unwrap()))
	}

	fn create(name: &str, bulk_id: Option<&str>) -> BulkOperationRequest {
		BulkOperationRequest {
			method: BulkMethod::Post,
			path: "/Users".to_string(),
			bulk_id: bulk_id.map(str::to_string),
			data: Some(json!({ "userName": name })),
		}
	}

	fn request(operations: Vec<BulkOperationRequest>, fail_on_errors: Option<usize>) -> BulkRequest {
		BulkRequest {
			schemas: vec![],
			fail_on_errors,
			operations,
		}
	}

	fn ctx() -> RequestContext {
		RequestContext::system(TenantId::generate())
	}

	#[test]
	fn parses_supported_actions() {
		assert!(matches!(
			BulkAction::parse(BulkMethod::Delete, "/Groups/abc", None).unwrap(),
			BulkAction::DeleteGroup { id } if id == "abc"
		));
		assert!(matches!(
			BulkAction::parse(BulkMethod::Post, "Users", Some(json!({"userName": "a"}))).unwrap(),
			BulkAction::CreateUser(_)
		));
	}

	#[test]
	fn rejects_unsupported_combinations() {
		let err = BulkAction::parse(BulkMethod::Delete, "/Users", None).unwrap_err();
		assert_eq!(err.scim_type(), Some(tessera_scim::ScimErrorType::InvalidSyntax));

		let err = BulkAction::parse(BulkMethod::Post, "/Widgets", Some(json!({}))).unwrap_err();
		assert_eq!(err.scim_type(), Some(tessera_scim::ScimErrorType::InvalidPath));

		let err = BulkAction::parse(BulkMethod::Put, "/Users/a/b", Some(json!({}))).unwrap_err();
		assert_eq!(err.scim_type(), Some(tessera_scim::ScimErrorType::InvalidPath));

		let err = BulkAction::parse(BulkMethod::Patch, "/Users/a", None).unwrap_err();
		assert_eq!(err.scim_type(), Some(tessera_scim::ScimErrorType::InvalidSyntax));
	}

	#[tokio::test]
	async fn stops_when_failure_threshold_is_reached() {
		let target = FakeTarget::default();
		let names = ["a", "b", "fail", "c", "fail", "d", "e", "f", "g", "h"];
		let ops = names.iter().map(|n| create(n, None)).collect();

		let response = coordinator()
			.process(&ctx(), &target, request(ops, Some(2)), 0)
			.await
			.unwrap();

		assert_eq!(response.operations.len(), 5);
		assert!(response.operations[2].is_failure());
		assert!(response.operations[4].is_failure());
		assert_eq!(response.operations[4].status, "409");
		assert_eq!(target.executed.lock().len(), 5);
	}

	#[tokio::test]
	async fn no_threshold_runs_everything() {
		let target = FakeTarget::default();
		let ops: Vec<_> = ["fail", "fail", "fail", "a"].iter().map(|n| create(n, None)).collect();

		for threshold in [None, Some(0)] {
			let response = coordinator()
				.process(&ctx(), &target, request(ops.clone(), threshold), 0)
				.await
				.unwrap();
			assert_eq!(response.operations.len(), 4);
		}
	}

	#[tokio::test]
	async fn bulk_id_references_resolve_in_data_and_path() {
		let target = FakeTarget::default();
		let ops = vec![
			create("ada", Some("u1")),
			BulkOperationRequest {
				method: BulkMethod::Post,
				path: "/Groups".to_string(),
				bulk_id: Some("g1".to_string()),
				data: Some(json!({
					"displayName": "Eng",
					"members": [{"value": "bulkId:u1"}]
				})),
			},
			BulkOperationRequest {
				method: BulkMethod::Delete,
				path: "/Users/bulkId:u1".to_string(),
				bulk_id: None,
				data: None,
			},
		];

		let response = coordinator()
			.process(&ctx(), &target, request(ops, None), 0)
			.await
			.unwrap();
		assert!(response.operations.iter().all(|r| !r.is_failure()));
		assert_eq!(
			*target.executed.lock(),
			vec!["ada".to_string(), "group:id-ada".to_string(), "delete:id-ada".to_string()]
		);
	}

	#[tokio::test]
	async fn unresolved_reference_is_a_per_operation_failure() {
		let target = FakeTarget::default();
		let ops = vec![
			BulkOperationRequest {
				method: BulkMethod::Delete,
				path: "/Users/bulkId:missing".to_string(),
				bulk_id: None,
				data: None,
			},
			create("ok", None),
		];
		let response = coordinator()
			.process(&ctx(), &target, request(ops, None), 0)
			.await
			.unwrap();
		assert_eq!(response.operations[0].status, "400");
		assert_eq!(response.operations[0].response.as_ref().unwrap()["scimType"], "invalidValue");
		assert_eq!(response.operations[1].status, "201");
	}

	#[tokio::test]
	async fn batch_limits_are_enforced_up_front() {
		let target = FakeTarget::default();
		let small = BulkCoordinator::new(2, 100, Arc::new(ProvisioningMetrics::new().unwrap()));

		let too_many = (0..3).map(|i| create(&i.to_string(), None)).collect();
		assert!(matches!(
			small.process(&ctx(), &target, request(too_many, None), 10).await,
			Err(ProvisioningError::PayloadTooLarge(_))
		));
		assert!(matches!(
			small.process(&ctx(), &target, request(vec![create("a", None)], None), 101).await,
			Err(ProvisioningError::PayloadTooLarge(_))
		));
		assert!(target.executed.lock().is_empty());
	}

	#[tokio::test]
	async fn duplicate_bulk_ids_are_rejected() {
		let target = FakeTarget::default();
		let ops = vec![create("a", Some("x")), create("b", Some("x"))];
		let err = coordinator()
			.process(&ctx(), &target, request(ops, None), 0)
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 400);
	}

	#[tokio::test]
	async fn cancellation_stops_the_batch() {
		let target = FakeTarget::default();
		let cancel = CancellationToken::new();
		let ctx = ctx().with_cancellation(cancel.clone());
		cancel.cancel();

		let result = coordinator()
			.process(&ctx, &target, request(vec![create("a", None)], None), 0)
			.await;
		assert!(matches!(result, Err(ProvisioningError::Cancelled)));
		assert!(target.executed.lock().is_empty());
	}

	#[tokio::test]
	async fn requires_bulk_scope() {
		let target = FakeTarget::default();
		let mut ctx = ctx();
		ctx.scopes = vec![ProvisioningScope::UsersWrite];
		assert!(matches!(
			coordinator().process(&ctx, &target, request(vec![], None), 0).await,
			Err(ProvisioningError::Authorization(_))
		));
	}
}
