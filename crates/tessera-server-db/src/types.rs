// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_server_auth::TenantId;

/// Binds a SCIM group to a backend team within one tenant.
///
/// `scim_id` is the identifier served to the identity provider, `external_id`
/// the identifier the provider supplied (if any) and `team_ref` the backend
/// team. `(tenant_id, external_id)` and `(tenant_id, team_ref)` are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMapping {
	pub tenant_id: TenantId,
	pub scim_id: String,
	pub external_id: Option<String>,
	pub team_ref: String,
	pub display_name: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Binds an identity-provider `externalId` to an internal account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMapping {
	pub tenant_id: TenantId,
	pub account_id: String,
	pub external_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// One row of a tenant's attribute translation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
	pub scim_path: String,
	pub target_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
	/// Deactivate and keep the account resolvable.
	Soft,
	/// Remove membership and delete the account.
	Hard,
}

impl DeleteMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeleteMode::Soft => "soft",
			DeleteMode::Hard => "hard",
		}
	}
}

impl fmt::Display for DeleteMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DeleteMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"soft" => Ok(DeleteMode::Soft),
			"hard" => Ok(DeleteMode::Hard),
			other => Err(format!("unknown delete mode '{other}'")),
		}
	}
}

/// Per-tenant provisioning policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
	pub prevent_duplicates: bool,
	pub auto_activate: bool,
	pub delete_mode: DeleteMode,
	pub sync_groups: bool,
}

impl Default for TenantSettings {
	fn default() -> Self {
		Self {
			prevent_duplicates: true,
			auto_activate: true,
			delete_mode: DeleteMode::Soft,
			sync_groups: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningLogEntry {
	pub id: String,
	pub tenant_id: TenantId,
	pub event_type: String,
	pub resource_type: Option<String>,
	pub resource_id: Option<String>,
	pub outcome: String,
	pub details: serde_json::Value,
	pub created_at: DateTime<Utc>,
}
