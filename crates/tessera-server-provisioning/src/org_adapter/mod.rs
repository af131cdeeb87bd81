// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One membership/team contract over two organization backends.
//!
//! A tenant maps onto one backend organization. Tenant members are the
//! accounts provisioned into it; SCIM groups are backend teams. The engine
//! only ever sees [`OrgAdapter`], [`MemberRef`] and [`TeamRef`]; which
//! backend sits behind it is decided once when the service is built.

mod app;
mod organization;

pub use app::{AppBackend, AppMembership, AppOrgAdapter, AppRole, InMemoryAppBackend};
pub use organization::{
	InMemoryOrgBackend, OrgBackend, OrgMember, OrgTeam, OrganizationOrgAdapter,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tessera_server_auth::{AccountId, TenantId};

#[derive(Debug, thiserror::Error)]
pub enum OrgAdapterError {
	#[error("{0} not found")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("backend error: {0}")]
	Backend(String),
}

/// A tenant membership. `member_id` is the backend's own membership key and
/// is what team operations take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRef {
	pub member_id: String,
	pub account_id: AccountId,
	pub role: String,
	pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamRef {
	pub team_id: String,
	pub name: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberPage {
	pub members: Vec<MemberRef>,
	/// Total members in the tenant, independent of the page window.
	pub total: usize,
}

#[async_trait]
pub trait OrgAdapter: Send + Sync {
	fn backend_name(&self) -> &'static str;

	/// Idempotent. Returns the existing membership if there is one.
	async fn add_member(
		&self,
		tenant: &TenantId,
		account: &AccountId,
	) -> Result<MemberRef, OrgAdapterError>;

	/// Also drops the member from every team. Returns false if absent.
	async fn remove_member(
		&self,
		tenant: &TenantId,
		account: &AccountId,
	) -> Result<bool, OrgAdapterError>;

	async fn is_member(&self, tenant: &TenantId, account: &AccountId) -> Result<bool, OrgAdapterError>;

	/// Members in stable order starting at `offset`.
	async fn list_members(
		&self,
		tenant: &TenantId,
		offset: usize,
		limit: usize,
	) -> Result<MemberPage, OrgAdapterError>;

	async fn create_team(&self, tenant: &TenantId, name: &str) -> Result<TeamRef, OrgAdapterError>;

	async fn get_team(&self, tenant: &TenantId, team_id: &str) -> Result<Option<TeamRef>, OrgAdapterError>;

	async fn list_teams(&self, tenant: &TenantId) -> Result<Vec<TeamRef>, OrgAdapterError>;

	async fn update_team(
		&self,
		tenant: &TenantId,
		team_id: &str,
		name: &str,
	) -> Result<TeamRef, OrgAdapterError>;

	async fn delete_team(&self, tenant: &TenantId, team_id: &str) -> Result<bool, OrgAdapterError>;

	/// Idempotent.
	async fn add_team_member(
		&self,
		tenant: &TenantId,
		team_id: &str,
		member_id: &str,
	) -> Result<(), OrgAdapterError>;

	/// Idempotent.
	async fn remove_team_member(
		&self,
		tenant: &TenantId,
		team_id: &str,
		member_id: &str,
	) -> Result<(), OrgAdapterError>;

	async fn list_team_members(
		&self,
		tenant: &TenantId,
		team_id: &str,
	) -> Result<Vec<MemberRef>, OrgAdapterError>;

	/// The membership key for an account, or `None` if it is not a member.
	async fn resolve_member_id(
		&self,
		tenant: &TenantId,
		account: &AccountId,
	) -> Result<Option<String>, OrgAdapterError>;
}

#[cfg(test)]
mod contract_tests {
	//! Every adapter must satisfy the same contract.

	use super::*;
	use std::sync::Arc;

	fn adapters() -> Vec<Arc<dyn OrgAdapter>> {
		vec![
			Arc::new(AppOrgAdapter::new(Arc::new(InMemoryAppBackend::new()))),
			Arc::new(OrganizationOrgAdapter::new(Arc::new(InMemoryOrgBackend::new()))),
		]
	}

	#[tokio::test]
	async fn membership_is_idempotent_and_tenant_scoped() {
		for adapter in adapters() {
			let tenant = TenantId::generate();
			let other = TenantId::generate();
			let account = AccountId::generate();

			let first = adapter.add_member(&tenant, &account).await.unwrap();
			let second = adapter.add_member(&tenant, &account).await.unwrap();
			assert_eq!(first.member_id, second.member_id, "{}", adapter.backend_name());

			assert!(adapter.is_member(&tenant, &account).await.unwrap());
			assert!(!adapter.is_member(&other, &account).await.unwrap());
			assert_eq!(
				adapter.resolve_member_id(&tenant, &account).await.unwrap(),
				Some(first.member_id.clone())
			);

			assert!(adapter.remove_member(&tenant, &account).await.unwrap());
			assert!(!adapter.remove_member(&tenant, &account).await.unwrap());
			assert!(adapter
				.resolve_member_id(&tenant, &account)
				.await
				.unwrap()
				.is_none());
		}
	}

	#[tokio::test]
	async fn list_members_pages_with_stable_total() {
		for adapter in adapters() {
			let tenant = TenantId::generate();
			for _ in 0..5 {
				adapter.add_member(&tenant, &AccountId::generate()).await.unwrap();
			}

			let first = adapter.list_members(&tenant, 0, 2).await.unwrap();
			let unaligned = adapter.list_members(&tenant, 1, 3).await.unwrap();
			let tail = adapter.list_members(&tenant, 4, 10).await.unwrap();
			let all = adapter.list_members(&tenant, 0, 10).await.unwrap();

			assert_eq!(first.total, 5, "{}", adapter.backend_name());
			assert_eq!(first.members.len(), 2);
			assert_eq!(unaligned.members.len(), 3);
			assert_eq!(tail.members.len(), 1);
			assert_eq!(unaligned.members[..], all.members[1..4], "{}", adapter.backend_name());
			assert_eq!(tail.members[0], all.members[4]);
		}
	}

	#[tokio::test]
	async fn team_lifecycle() {
		for adapter in adapters() {
			let tenant = TenantId::generate();
			let account = AccountId::generate();
			let member = adapter.add_member(&tenant, &account).await.unwrap();

			let team = adapter.create_team(&tenant, "Engineering").await.unwrap();
			assert_eq!(team.name, "Engineering");
			assert_eq!(adapter.list_teams(&tenant).await.unwrap().len(), 1);

			adapter
				.add_team_member(&tenant, &team.team_id, &member.member_id)
				.await
				.unwrap();
			adapter
				.add_team_member(&tenant, &team.team_id, &member.member_id)
				.await
				.unwrap();
			let members = adapter.list_team_members(&tenant, &team.team_id).await.unwrap();
			assert_eq!(members.len(), 1, "{}", adapter.backend_name());
			assert_eq!(members[0].account_id, account);

			let renamed = adapter
				.update_team(&tenant, &team.team_id, "Platform")
				.await
				.unwrap();
			assert_eq!(renamed.name, "Platform");

			adapter
				.remove_team_member(&tenant, &team.team_id, &member.member_id)
				.await
				.unwrap();
			assert!(adapter
				.list_team_members(&tenant, &team.team_id)
				.await
				.unwrap()
				.is_empty());

			assert!(adapter.delete_team(&tenant, &team.team_id).await.unwrap());
			assert!(adapter.get_team(&tenant, &team.team_id).await.unwrap().is_none());
		}
	}

	#[tokio::test]
	async fn teams_are_invisible_across_tenants() {
		for adapter in adapters() {
			let tenant = TenantId::generate();
			let other = TenantId::generate();
			let team = adapter.create_team(&tenant, "Ops").await.unwrap();

			assert!(adapter.get_team(&other, &team.team_id).await.unwrap().is_none());
			assert!(matches!(
				adapter.update_team(&other, &team.team_id, "x").await,
				Err(OrgAdapterError::NotFound(_))
			));
			assert!(!adapter.delete_team(&other, &team.team_id).await.unwrap());
		}
	}

	#[tokio::test]
	async fn removing_member_drops_team_membership() {
		for adapter in adapters() {
			let tenant = TenantId::generate();
			let account = AccountId::generate();
			let member = adapter.add_member(&tenant, &account).await.unwrap();
			let team = adapter.create_team(&tenant, "Sales").await.unwrap();
			adapter
				.add_team_member(&tenant, &team.team_id, &member.member_id)
				.await
				.unwrap();

			adapter.remove_member(&tenant, &account).await.unwrap();
			assert!(adapter
				.list_team_members(&tenant, &team.team_id)
				.await
				.unwrap()
				.is_empty());
		}
	}

	#[tokio::test]
	async fn malformed_ids_are_not_found() {
		for adapter in adapters() {
			let tenant = TenantId::generate();
			assert!(adapter.get_team(&tenant, "not-an-id").await.unwrap().is_none());
			assert!(matches!(
				adapter.add_team_member(&tenant, "not-an-id", "nope").await,
				Err(OrgAdapterError::NotFound(_))
			));
		}
	}
}
