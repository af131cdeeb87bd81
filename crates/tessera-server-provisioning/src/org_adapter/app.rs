// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Adapter for application-scoped backends: access grants and role groups,
//! keyed by UUID and paginated by page number.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tessera_server_auth::{AccountId, TenantId};
use uuid::Uuid;

use super::{MemberPage, MemberRef, OrgAdapter, OrgAdapterError, TeamRef};

const DEFAULT_ROLE: &str = "member";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMembership {
	pub id: Uuid,
	pub app_id: Uuid,
	pub user_id: Uuid,
	pub role: String,
	pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRole {
	pub id: Uuid,
	pub app_id: Uuid,
	pub label: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Native surface of an application backend. Pages are 1-based.
#[async_trait]
pub trait AppBackend: Send + Sync {
	async fn grant_access(&self, app_id: Uuid, user_id: Uuid, role: &str) -> Result<AppMembership, OrgAdapterError>;
	async fn revoke_access(&self, app_id: Uuid, user_id: Uuid) -> Result<bool, OrgAdapterError>;
	async fn membership_for_user(&self, app_id: Uuid, user_id: Uuid) -> Result<Option<AppMembership>, OrgAdapterError>;
	async fn membership(&self, app_id: Uuid, membership_id: Uuid) -> Result<Option<AppMembership>, OrgAdapterError>;
	/// Returns the page and the total number of memberships.
	async fn memberships(
		&self,
		app_id: Uuid,
		page: u32,
		per_page: u32,
	) -> Result<(Vec<AppMembership>, u64), OrgAdapterError>;

	async fn create_role(&self, app_id: Uuid, label: &str) -> Result<AppRole, OrgAdapterError>;
	async fn role(&self, app_id: Uuid, role_id: Uuid) -> Result<Option<AppRole>, OrgAdapterError>;
	async fn roles(&self, app_id: Uuid) -> Result<Vec<AppRole>, OrgAdapterError>;
	async fn relabel_role(&self, app_id: Uuid, role_id: Uuid, label: &str) -> Result<AppRole, OrgAdapterError>;
	async fn drop_role(&self, app_id: Uuid, role_id: Uuid) -> Result<bool, OrgAdapterError>;
	async fn assign_role(&self, app_id: Uuid, role_id: Uuid, membership_id: Uuid) -> Result<(), OrgAdapterError>;
	async fn unassign_role(&self, app_id: Uuid, role_id: Uuid, membership_id: Uuid) -> Result<(), OrgAdapterError>;
	async fn role_holders(&self, app_id: Uuid, role_id: Uuid) -> Result<Vec<AppMembership>, OrgAdapterError>;
}

pub struct AppOrgAdapter {
	backend: Arc<dyn AppBackend>,
}

impl AppOrgAdapter {
	pub fn new(backend: Arc<dyn AppBackend>) -> Self {
		Self { backend }
	}

	fn member_ref(m: AppMembership) -> MemberRef {
		MemberRef {
			member_id: m.id.to_string(),
			account_id: AccountId::new(m.user_id),
			role: m.role,
			joined_at: m.granted_at,
		}
	}

	fn team_ref(r: AppRole) -> TeamRef {
		TeamRef {
			team_id: r.id.to_string(),
			name: r.label,
			created_at: r.created_at,
			updated_at: r.updated_at,
		}
	}

	fn parse_id(id: &str, what: &str) -> Result<Uuid, OrgAdapterError> {
		Uuid::parse_str(id).map_err(|_| OrgAdapterError::NotFound(format!("{what} {id}")))
	}

	/// The role must belong to this app.
	async fn owned_role(&self, app_id: Uuid, team_id: &str) -> Result<Uuid, OrgAdapterError> {
		let role_id = Self::parse_id(team_id, "team")?;
		match self.backend.role(app_id, role_id).await? {
			Some(_) => Ok(role_id),
			None => Err(OrgAdapterError::NotFound(format!("team {team_id}"))),
		}
	}
}

#[async_trait]
impl OrgAdapter for AppOrgAdapter {
	fn backend_name(&self) -> &'static str {
		"app"
	}

	async fn add_member(&self, tenant: &TenantId, account: &AccountId) -> Result<MemberRef, OrgAdapterError> {
		let app_id = tenant.into_inner();
		if let Some(existing) = self
			.backend
			.membership_for_user(app_id, account.into_inner())
			.await?
		{
			return Ok(Self::member_ref(existing));
		}
		let granted = self
			.backend
			.grant_access(app_id, account.into_inner(), DEFAULT_ROLE)
			.await?;
		Ok(Self::member_ref(granted))
	}

	async fn remove_member(&self, tenant: &TenantId, account: &AccountId) -> Result<bool, OrgAdapterError> {
		self.backend
			.revoke_access(tenant.into_inner(), account.into_inner())
			.await
	}

	async fn is_member(&self, tenant: &TenantId, account: &AccountId) -> Result<bool, OrgAdapterError> {
		Ok(self
			.backend
			.membership_for_user(tenant.into_inner(), account.into_inner())
			.await?
			.is_some())
	}

	async fn list_members(
		&self,
		tenant: &TenantId,
		offset: usize,
		limit: usize,
	) -> Result<MemberPage, OrgAdapterError> {
		let app_id = tenant.into_inner();
		if limit == 0 {
			let (_, total) = self.backend.memberships(app_id, 1, 1).await?;
			return Ok(MemberPage {
				members: Vec::new(),
				total: total as usize,
			});
		}

		// An offset window spans at most two backend pages of `limit` size.
		let per_page = u32::try_from(limit).unwrap_or(u32::MAX);
		let page = u32::try_from(offset / limit + 1).unwrap_or(u32::MAX);
		let skip = offset % limit;

		let (mut members, total) = self.backend.memberships(app_id, page, per_page).await?;
		if skip > 0 && members.len() == limit {
			let (next, _) = self
				.backend
				.memberships(app_id, page.saturating_add(1), per_page)
				.await?;
			members.extend(next);
		}

		Ok(MemberPage {
			members: members
				.into_iter()
				.skip(skip)
				.take(limit)
				.map(Self::member_ref)
				.collect(),
			total: total as usize,
		})
	}

	async fn create_team(&self, tenant: &TenantId, name: &str) -> Result<TeamRef, OrgAdapterError> {
		Ok(Self::team_ref(
			self.backend.create_role(tenant.into_inner(), name).await?,
		))
	}

	async fn get_team(&self, tenant: &TenantId, team_id: &str) -> Result<Option<TeamRef>, OrgAdapterError> {
		let Ok(role_id) = Uuid::parse_str(team_id) else {
			return Ok(None);
		};
		Ok(self
			.backend
			.role(tenant.into_inner(), role_id)
			.await?
			.map(Self::team_ref))
	}

	async fn list_teams(&self, tenant: &TenantId) -> Result<Vec<TeamRef>, OrgAdapterError> {
		Ok(self
			.backend
			.roles(tenant.into_inner())
			.await?
			.into_iter()
			.map(Self::team_ref)
			.collect())
	}

	async fn update_team(&self, tenant: &TenantId, team_id: &str, name: &str) -> Result<TeamRef, OrgAdapterError> {
		let app_id = tenant.into_inner();
		let role_id = self.owned_role(app_id, team_id).await?;
		Ok(Self::team_ref(
			self.backend.relabel_role(app_id, role_id, name).await?,
		))
	}

	async fn delete_team(&self, tenant: &TenantId, team_id: &str) -> Result<bool, OrgAdapterError> {
		let Ok(role_id) = Uuid::parse_str(team_id) else {
			return Ok(false);
		};
		self.backend.drop_role(tenant.into_inner(), role_id).await
	}

	async fn add_team_member(&self, tenant: &TenantId, team_id: &str, member_id: &str) -> Result<(), OrgAdapterError> {
		let app_id = tenant.into_inner();
		let role_id = self.owned_role(app_id, team_id).await?;
		let membership_id = Self::parse_id(member_id, "member")?;
		if self.backend.membership(app_id, membership_id).await?.is_none() {
			return Err(OrgAdapterError::NotFound(format!("member {member_id}")));
		}
		self.backend.assign_role(app_id, role_id, membership_id).await
	}

	async fn remove_team_member(
		&self,
		tenant: &TenantId,
		team_id: &str,
		member_id: &str,
	) -> Result<(), OrgAdapterError> {
		let app_id = tenant.into_inner();
		let role_id = self.owned_role(app_id, team_id).await?;
		let Ok(membership_id) = Uuid::parse_str(member_id) else {
			return Ok(());
		};
		self.backend.unassign_role(app_id, role_id, membership_id).await
	}

	async fn list_team_members(&self, tenant: &TenantId, team_id: &str) -> Result<Vec<MemberRef>, OrgAdapterError> {
		let app_id = tenant.into_inner();
		let role_id = self.owned_role(app_id, team_id).await?;
		Ok(self
			.backend
			.role_holders(app_id, role_id)
			.await?
			.into_iter()
			.map(Self::member_ref)
			.collect())
	}

	async fn resolve_member_id(&self, tenant: &TenantId, account: &AccountId) -> Result<Option<String>, OrgAdapterError> {
		Ok(self
			.backend
			.membership_for_user(tenant.into_inner(), account.into_inner())
			.await?
			.map(|m| m.id.to_string()))
	}
}

#[derive(Default)]
struct AppState {
	memberships: BTreeMap<(Uuid, Uuid), AppMembership>,
	roles: BTreeMap<(Uuid, Uuid), AppRole>,
	/// (app, role) -> membership ids.
	holders: BTreeMap<(Uuid, Uuid), BTreeSet<Uuid>>,
	next_seq: u64,
	/// membership id -> insertion sequence, for listing in grant order.
	seq: BTreeMap<Uuid, u64>,
}

/// Process-local application backend.
#[derive(Default)]
pub struct InMemoryAppBackend {
	state: RwLock<AppState>,
}

impl InMemoryAppBackend {
	pub fn new() -> Self {
		Self::default()
	}

	fn ordered(state: &AppState, app_id: Uuid) -> Vec<AppMembership> {
		let mut members: Vec<AppMembership> = state
			.memberships
			.values()
			.filter(|m| m.app_id == app_id)
			.cloned()
			.collect();
		members.sort_by_key(|m| state.seq.get(&m.id).copied().unwrap_or(u64::MAX));
		members
	}
}

#[async_trait]
impl AppBackend for InMemoryAppBackend {
	async fn grant_access(&self, app_id: Uuid, user_id: Uuid, role: &str) -> Result<AppMembership, OrgAdapterError> {
		let mut state = self.state.write();
		if state
			.memberships
			.values()
			.any(|m| m.app_id == app_id && m.user_id == user_id)
		{
			return Err(OrgAdapterError::Conflict(format!("user {user_id} already has access")));
		}
		let membership = AppMembership {
			id: Uuid::new_v4(),
			app_id,
			user_id,
			role: role.to_string(),
			granted_at: Utc::now(),
		};
		state.next_seq += 1;
		let seq = state.next_seq;
		state.seq.insert(membership.id, seq);
		state
			.memberships
			.insert((app_id, membership.id), membership.clone());
		Ok(membership)
	}

	async fn revoke_access(&self, app_id: Uuid, user_id: Uuid) -> Result<bool, OrgAdapterError> {
		let mut state = self.state.write();
		let Some(id) = state
			.memberships
			.values()
			.find(|m| m.app_id == app_id && m.user_id == user_id)
			.map(|m| m.id)
		else {
			return Ok(false);
		};
		state.memberships.remove(&(app_id, id));
		state.seq.remove(&id);
		for ((holder_app, _), ids) in state.holders.iter_mut() {
			if *holder_app == app_id {
				ids.remove(&id);
			}
		}
		Ok(true)
	}

	async fn membership_for_user(&self, app_id: Uuid, user_id: Uuid) -> Result<Option<AppMembership>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.memberships
			.values()
			.find(|m| m.app_id == app_id && m.user_id == user_id)
			.cloned())
	}

	async fn membership(&self, app_id: Uuid, membership_id: Uuid) -> Result<Option<AppMembership>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.memberships
			.get(&(app_id, membership_id))
			.cloned())
	}

	async fn memberships(
		&self,
		app_id: Uuid,
		page: u32,
		per_page: u32,
	) -> Result<(Vec<AppMembership>, u64), OrgAdapterError> {
		let state = self.state.read();
		let all = Self::ordered(&state, app_id);
		let total = all.len() as u64;
		let per_page = per_page.max(1) as usize;
		let start = (page.max(1) as usize - 1).saturating_mul(per_page);
		Ok((all.into_iter().skip(start).take(per_page).collect(), total))
	}

	async fn create_role(&self, app_id: Uuid, label: &str) -> Result<AppRole, OrgAdapterError> {
		let now = Utc::now();
		let role = AppRole {
			id: Uuid::new_v4(),
			app_id,
			label: label.to_string(),
			created_at: now,
			updated_at: now,
		};
		self.state
			.write()
			.roles
			.insert((app_id, role.id), role.clone());
		Ok(role)
	}

	async fn role(&self, app_id: Uuid, role_id: Uuid) -> Result<Option<AppRole>, OrgAdapterError> {
		Ok(self.state.read().roles.get(&(app_id, role_id)).cloned())
	}

	async fn roles(&self, app_id: Uuid) -> Result<Vec<AppRole>, OrgAdapterError> {
		let mut roles: Vec<AppRole> = self
			.state
			.read()
			.roles
			.values()
			.filter(|r| r.app_id == app_id)
			.cloned()
			.collect();
		roles.sort_by_key(|r| r.created_at);
		Ok(roles)
	}

	async fn relabel_role(&self, app_id: Uuid, role_id: Uuid, label: &str) -> Result<AppRole, OrgAdapterError> {
		let mut state = self.state.write();
		let role = state
			.roles
			.get_mut(&(app_id, role_id))
			.ok_or_else(|| OrgAdapterError::NotFound(format!("role {role_id}")))?;
		role.label = label.to_string();
		role.updated_at = Utc::now();
		Ok(role.clone())
	}

	async fn drop_role(&self, app_id: Uuid, role_id: Uuid) -> Result<bool, OrgAdapterError> {
		let mut state = self.state.write();
		state.holders.remove(&(app_id, role_id));
		Ok(state.roles.remove(&(app_id, role_id)).is_some())
	}

	async fn assign_role(&self, app_id: Uuid, role_id: Uuid, membership_id: Uuid) -> Result<(), OrgAdapterError> {
		self.state
			.write()
			.holders
			.entry((app_id, role_id))
			.or_default()
			.insert(membership_id);
		Ok(())
	}

	async fn unassign_role(&self, app_id: Uuid, role_id: Uuid, membership_id: Uuid) -> Result<(), OrgAdapterError> {
		if let Some(ids) = self.state.write().holders.get_mut(&(app_id, role_id)) {
			ids.remove(&membership_id);
		}
		Ok(())
	}

	async fn role_holders(&self, app_id: Uuid, role_id: Uuid) -> Result<Vec<AppMembership>, OrgAdapterError> {
		let state = self.state.read();
		let Some(ids) = state.holders.get(&(app_id, role_id)) else {
			return Ok(Vec::new());
		};
		Ok(ids
			.iter()
			.filter_map(|id| state.memberships.get(&(app_id, *id)).cloned())
			.collect())
	}
}
