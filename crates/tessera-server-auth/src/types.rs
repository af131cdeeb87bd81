// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identifier newtypes and token scopes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			pub fn into_inner(self) -> Uuid {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Uuid::parse_str(s).map(Self)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}
	};
}

define_id_type!(TenantId, "The isolation boundary owning tokens, mappings and resources.");
define_id_type!(TokenId, "Stable identity of a provisioning token across rotations.");
define_id_type!(AccountId, "Internal identifier of an account in the identity store.");

/// Permission carried by a provisioning token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningScope {
	#[serde(rename = "users:read")]
	UsersRead,
	#[serde(rename = "users:write")]
	UsersWrite,
	#[serde(rename = "groups:read")]
	GroupsRead,
	#[serde(rename = "groups:write")]
	GroupsWrite,
	#[serde(rename = "bulk")]
	Bulk,
	/// Administrative surface. Implies every other scope.
	#[serde(rename = "admin")]
	Admin,
}

impl ProvisioningScope {
	pub fn all() -> &'static [ProvisioningScope] {
		&[
			ProvisioningScope::UsersRead,
			ProvisioningScope::UsersWrite,
			ProvisioningScope::GroupsRead,
			ProvisioningScope::GroupsWrite,
			ProvisioningScope::Bulk,
			ProvisioningScope::Admin,
		]
	}

	/// The scopes a token gets when none are requested.
	pub fn protocol_defaults() -> Vec<ProvisioningScope> {
		vec![
			ProvisioningScope::UsersRead,
			ProvisioningScope::UsersWrite,
			ProvisioningScope::GroupsRead,
			ProvisioningScope::GroupsWrite,
			ProvisioningScope::Bulk,
		]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			ProvisioningScope::UsersRead => "users:read",
			ProvisioningScope::UsersWrite => "users:write",
			ProvisioningScope::GroupsRead => "groups:read",
			ProvisioningScope::GroupsWrite => "groups:write",
			ProvisioningScope::Bulk => "bulk",
			ProvisioningScope::Admin => "admin",
		}
	}

	/// Whether a set of granted scopes satisfies `required`.
	pub fn is_granted(granted: &[ProvisioningScope], required: ProvisioningScope) -> bool {
		granted
			.iter()
			.any(|s| *s == required || *s == ProvisioningScope::Admin)
	}
}

impl fmt::Display for ProvisioningScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProvisioningScope {
	type Err = TokenError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ProvisioningScope::all()
			.iter()
			.copied()
			.find(|scope| scope.as_str() == s)
			.ok_or_else(|| TokenError::UnknownScope(s.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scope_round_trips_through_display() {
		for scope in ProvisioningScope::all() {
			assert_eq!(scope.to_string().parse::<ProvisioningScope>().unwrap(), *scope);
		}
	}

	#[test]
	fn scope_serializes_as_wire_string() {
		let json = serde_json::to_string(&ProvisioningScope::GroupsWrite).unwrap();
		assert_eq!(json, "\"groups:write\"");
	}

	#[test]
	fn admin_implies_everything() {
		let granted = [ProvisioningScope::Admin];
		for scope in ProvisioningScope::all() {
			assert!(ProvisioningScope::is_granted(&granted, *scope));
		}
	}

	#[test]
	fn missing_scope_is_not_granted() {
		let granted = [ProvisioningScope::UsersRead];
		assert!(!ProvisioningScope::is_granted(&granted, ProvisioningScope::UsersWrite));
		assert!(!ProvisioningScope::is_granted(&granted, ProvisioningScope::Admin));
	}

	#[test]
	fn unknown_scope_is_rejected() {
		assert!("threads:read".parse::<ProvisioningScope>().is_err());
	}

	#[test]
	fn tenant_id_parses_from_string() {
		let id = TenantId::generate();
		assert_eq!(id.to_string().parse::<TenantId>().unwrap(), id);
	}
}
