// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Adapter for organization backends with numeric member and team ids and
//! offset pagination.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tessera_server_auth::{AccountId, TenantId};
use uuid::Uuid;

use super::{MemberPage, MemberRef, OrgAdapter, OrgAdapterError, TeamRef};

const MEMBER_ROLE: &str = "member";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgMember {
	pub id: i64,
	pub org_id: Uuid,
	pub user_id: Uuid,
	pub role: String,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgTeam {
	pub id: i64,
	pub org_id: Uuid,
	pub name: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait OrgBackend: Send + Sync {
	async fn add_org_member(&self, org_id: Uuid, user_id: Uuid, role: &str) -> Result<OrgMember, OrgAdapterError>;
	async fn remove_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool, OrgAdapterError>;
	async fn find_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<OrgMember>, OrgAdapterError>;
	async fn get_org_member(&self, org_id: Uuid, member_id: i64) -> Result<Option<OrgMember>, OrgAdapterError>;
	/// Ordered by member id.
	async fn list_org_members(&self, org_id: Uuid, offset: u64, limit: u64) -> Result<Vec<OrgMember>, OrgAdapterError>;
	async fn count_org_members(&self, org_id: Uuid) -> Result<u64, OrgAdapterError>;

	async fn insert_team(&self, org_id: Uuid, name: &str) -> Result<OrgTeam, OrgAdapterError>;
	async fn find_team(&self, org_id: Uuid, team_id: i64) -> Result<Option<OrgTeam>, OrgAdapterError>;
	async fn list_teams(&self, org_id: Uuid) -> Result<Vec<OrgTeam>, OrgAdapterError>;
	async fn rename_team(&self, org_id: Uuid, team_id: i64, name: &str) -> Result<Option<OrgTeam>, OrgAdapterError>;
	async fn remove_team(&self, org_id: Uuid, team_id: i64) -> Result<bool, OrgAdapterError>;
	async fn add_team_member(&self, team_id: i64, member_id: i64) -> Result<(), OrgAdapterError>;
	async fn remove_team_member(&self, team_id: i64, member_id: i64) -> Result<(), OrgAdapterError>;
	async fn team_member_ids(&self, team_id: i64) -> Result<Vec<i64>, OrgAdapterError>;
}

pub struct OrganizationOrgAdapter {
	backend: Arc<dyn OrgBackend>,
}

impl OrganizationOrgAdapter {
	pub fn new(backend: Arc<dyn OrgBackend>) -> Self {
		Self { backend }
	}

	fn member_ref(m: OrgMember) -> MemberRef {
		MemberRef {
			member_id: m.id.to_string(),
			account_id: AccountId::new(m.user_id),
			role: m.role,
			joined_at: m.created_at,
		}
	}

	fn team_ref(t: OrgTeam) -> TeamRef {
		TeamRef {
			team_id: t.id.to_string(),
			name: t.name,
			created_at: t.created_at,
			updated_at: t.updated_at,
		}
	}

	/// Resolves a team id within the org. Ids that do not parse are unknown.
	async fn owned_team(&self, org_id: Uuid, team_id: &str) -> Result<i64, OrgAdapterError> {
		let not_found = || OrgAdapterError::NotFound(format!("team {team_id}"));
		let id: i64 = team_id.parse().map_err(|_| not_found())?;
		match self.backend.find_team(org_id, id).await? {
			Some(_) => Ok(id),
			None => Err(not_found()),
		}
	}
}

#[async_trait]
impl OrgAdapter for OrganizationOrgAdapter {
	fn backend_name(&self) -> &'static str {
		"organization"
	}

	async fn add_member(&self, tenant: &TenantId, account: &AccountId) -> Result<MemberRef, OrgAdapterError> {
		let org_id = tenant.into_inner();
		if let Some(existing) = self
			.backend
			.find_org_member(org_id, account.into_inner())
			.await?
		{
			return Ok(Self::member_ref(existing));
		}
		Ok(Self::member_ref(
			self.backend
				.add_org_member(org_id, account.into_inner(), MEMBER_ROLE)
				.await?,
		))
	}

	async fn remove_member(&self, tenant: &TenantId, account: &AccountId) -> Result<bool, OrgAdapterError> {
		self.backend
			.remove_org_member(tenant.into_inner(), account.into_inner())
			.await
	}

	async fn is_member(&self, tenant: &TenantId, account: &AccountId) -> Result<bool, OrgAdapterError> {
		Ok(self
			.backend
			.find_org_member(tenant.into_inner(), account.into_inner())
			.await?
			.is_some())
	}

	async fn list_members(&self, tenant: &TenantId, offset: usize, limit: usize) -> Result<MemberPage, OrgAdapterError> {
		let org_id = tenant.into_inner();
		let total = self.backend.count_org_members(org_id).await?;
		let members = if limit == 0 {
			Vec::new()
		} else {
			self.backend
				.list_org_members(org_id, offset as u64, limit as u64)
				.await?
		};
		Ok(MemberPage {
			members: members.into_iter().map(Self::member_ref).collect(),
			total: total as usize,
		})
	}

	async fn create_team(&self, tenant: &TenantId, name: &str) -> Result<TeamRef, OrgAdapterError> {
		Ok(Self::team_ref(
			self.backend.insert_team(tenant.into_inner(), name).await?,
		))
	}

	async fn get_team(&self, tenant: &TenantId, team_id: &str) -> Result<Option<TeamRef>, OrgAdapterError> {
		let Ok(id) = team_id.parse::<i64>() else {
			return Ok(None);
		};
		Ok(self
			.backend
			.find_team(tenant.into_inner(), id)
			.await?
			.map(Self::team_ref))
	}

	async fn list_teams(&self, tenant: &TenantId) -> Result<Vec<TeamRef>, OrgAdapterError> {
		Ok(self
			.backend
			.list_teams(tenant.into_inner())
			.await?
			.into_iter()
			.map(Self::team_ref)
			.collect())
	}

	async fn update_team(&self, tenant: &TenantId, team_id: &str, name: &str) -> Result<TeamRef, OrgAdapterError> {
		let org_id = tenant.into_inner();
		let id = self.owned_team(org_id, team_id).await?;
		self.backend
			.rename_team(org_id, id, name)
			.await?
			.map(Self::team_ref)
			.ok_or_else(|| OrgAdapterError::NotFound(format!("team {team_id}")))
	}

	async fn delete_team(&self, tenant: &TenantId, team_id: &str) -> Result<bool, OrgAdapterError> {
		let Ok(id) = team_id.parse::<i64>() else {
			return Ok(false);
		};
		self.backend.remove_team(tenant.into_inner(), id).await
	}

	async fn add_team_member(&self, tenant: &TenantId, team_id: &str, member_id: &str) -> Result<(), OrgAdapterError> {
		let org_id = tenant.into_inner();
		let team = self.owned_team(org_id, team_id).await?;
		let not_found = || OrgAdapterError::NotFound(format!("member {member_id}"));
		let member: i64 = member_id.parse().map_err(|_| not_found())?;
		if self.backend.get_org_member(org_id, member).await?.is_none() {
			return Err(not_found());
		}
		self.backend.add_team_member(team, member).await
	}

	async fn remove_team_member(&self, tenant: &TenantId, team_id: &str, member_id: &str) -> Result<(), OrgAdapterError> {
		let team = self.owned_team(tenant.into_inner(), team_id).await?;
		let Ok(member) = member_id.parse::<i64>() else {
			return Ok(());
		};
		self.backend.remove_team_member(team, member).await
	}

	async fn list_team_members(&self, tenant: &TenantId, team_id: &str) -> Result<Vec<MemberRef>, OrgAdapterError> {
		let org_id = tenant.into_inner();
		let team = self.owned_team(org_id, team_id).await?;
		let mut members = Vec::new();
		for id in self.backend.team_member_ids(team).await? {
			if let Some(member) = self.backend.get_org_member(org_id, id).await? {
				members.push(Self::member_ref(member));
			}
		}
		Ok(members)
	}

	async fn resolve_member_id(&self, tenant: &TenantId, account: &AccountId) -> Result<Option<String>, OrgAdapterError> {
		Ok(self
			.backend
			.find_org_member(tenant.into_inner(), account.into_inner())
			.await?
			.map(|m| m.id.to_string()))
	}
}

#[derive(Default)]
struct OrgState {
	next_id: i64,
	members: BTreeMap<i64, OrgMember>,
	teams: BTreeMap<i64, OrgTeam>,
	team_members: BTreeMap<i64, BTreeSet<i64>>,
}

impl OrgState {
	fn next_id(&mut self) -> i64 {
		self.next_id += 1;
		self.next_id
	}
}

/// Process-local organization backend.
#[derive(Default)]
pub struct InMemoryOrgBackend {
	state: RwLock<OrgState>,
}

impl InMemoryOrgBackend {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl OrgBackend for InMemoryOrgBackend {
	async fn add_org_member(&self, org_id: Uuid, user_id: Uuid, role: &str) -> Result<OrgMember, OrgAdapterError> {
		let mut state = self.state.write();
		if state
			.members
			.values()
			.any(|m| m.org_id == org_id && m.user_id == user_id)
		{
			return Err(OrgAdapterError::Conflict(format!("user {user_id} is already a member")));
		}
		let member = OrgMember {
			id: state.next_id(),
			org_id,
			user_id,
			role: role.to_string(),
			created_at: Utc::now(),
		};
		state.members.insert(member.id, member.clone());
		Ok(member)
	}

	async fn remove_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool, OrgAdapterError> {
		let mut state = self.state.write();
		let Some(id) = state
			.members
			.values()
			.find(|m| m.org_id == org_id && m.user_id == user_id)
			.map(|m| m.id)
		else {
			return Ok(false);
		};
		state.members.remove(&id);
		for ids in state.team_members.values_mut() {
			ids.remove(&id);
		}
		Ok(true)
	}

	async fn find_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<OrgMember>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.members
			.values()
			.find(|m| m.org_id == org_id && m.user_id == user_id)
			.cloned())
	}

	async fn get_org_member(&self, org_id: Uuid, member_id: i64) -> Result<Option<OrgMember>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.members
			.get(&member_id)
			.filter(|m| m.org_id == org_id)
			.cloned())
	}

	async fn list_org_members(&self, org_id: Uuid, offset: u64, limit: u64) -> Result<Vec<OrgMember>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.members
			.values()
			.filter(|m| m.org_id == org_id)
			.skip(offset as usize)
			.take(limit as usize)
			.cloned()
			.collect())
	}

	async fn count_org_members(&self, org_id: Uuid) -> Result<u64, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.members
			.values()
			.filter(|m| m.org_id == org_id)
			.count() as u64)
	}

	async fn insert_team(&self, org_id: Uuid, name: &str) -> Result<OrgTeam, OrgAdapterError> {
		let mut state = self.state.write();
		let now = Utc::now();
		let team = OrgTeam {
			id: state.next_id(),
			org_id,
			name: name.to_string(),
			created_at: now,
			updated_at: now,
		};
		state.teams.insert(team.id, team.clone());
		Ok(team)
	}

	async fn find_team(&self, org_id: Uuid, team_id: i64) -> Result<Option<OrgTeam>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.teams
			.get(&team_id)
			.filter(|t| t.org_id == org_id)
			.cloned())
	}

	async fn list_teams(&self, org_id: Uuid) -> Result<Vec<OrgTeam>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.teams
			.values()
			.filter(|t| t.org_id == org_id)
			.cloned()
			.collect())
	}

	async fn rename_team(&self, org_id: Uuid, team_id: i64, name: &str) -> Result<Option<OrgTeam>, OrgAdapterError> {
		let mut state = self.state.write();
		let Some(team) = state.teams.get_mut(&team_id).filter(|t| t.org_id == org_id) else {
			return Ok(None);
		};
		team.name = name.to_string();
		team.updated_at = Utc::now();
		Ok(Some(team.clone()))
	}

	async fn remove_team(&self, org_id: Uuid, team_id: i64) -> Result<bool, OrgAdapterError> {
		let mut state = self.state.write();
		if !state.teams.get(&team_id).is_some_and(|t| t.org_id == org_id) {
			return Ok(false);
		}
		state.teams.remove(&team_id);
		state.team_members.remove(&team_id);
		Ok(true)
	}

	async fn add_team_member(&self, team_id: i64, member_id: i64) -> Result<(), OrgAdapterError> {
		let mut state = self.state.write();
		if !state.teams.contains_key(&team_id) {
			return Err(OrgAdapterError::NotFound(format!("team {team_id}")));
		}
		state.team_members.entry(team_id).or_default().insert(member_id);
		Ok(())
	}

	async fn remove_team_member(&self, team_id: i64, member_id: i64) -> Result<(), OrgAdapterError> {
		if let Some(ids) = self.state.write().team_members.get_mut(&team_id) {
			ids.remove(&member_id);
		}
		Ok(())
	}

	async fn team_member_ids(&self, team_id: i64) -> Result<Vec<i64>, OrgAdapterError> {
		Ok(self
			.state
			.read()
			.team_members
			.get(&team_id)
			.map(|ids| ids.iter().copied().collect())
			.unwrap_or_default())
	}
}
