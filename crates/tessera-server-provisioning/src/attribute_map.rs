// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-tenant translation of protocol attribute paths to account fields.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tessera_scim::filter::normalize_path;
use tessera_server_db::AttributeMapping;
use tracing::warn;

use crate::error::ProvisioningError;

/// A writable field on an account, or on its user mapping for `ExternalId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountField {
	Email,
	UserName,
	DisplayName,
	GivenName,
	FamilyName,
	Active,
	ExternalId,
}

impl AccountField {
	pub fn as_str(&self) -> &'static str {
		match self {
			AccountField::Email => "email",
			AccountField::UserName => "user_name",
			AccountField::DisplayName => "display_name",
			AccountField::GivenName => "given_name",
			AccountField::FamilyName => "family_name",
			AccountField::Active => "active",
			AccountField::ExternalId => "external_id",
		}
	}

	/// Required fields cannot be removed by a patch.
	pub fn is_required(&self) -> bool {
		matches!(
			self,
			AccountField::Email | AccountField::UserName | AccountField::Active
		)
	}
}

impl fmt::Display for AccountField {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AccountField {
	type Err = ProvisioningError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"email" => Ok(AccountField::Email),
			"user_name" | "username" => Ok(AccountField::UserName),
			"display_name" | "displayname" => Ok(AccountField::DisplayName),
			"given_name" | "givenname" => Ok(AccountField::GivenName),
			"family_name" | "familyname" => Ok(AccountField::FamilyName),
			"active" => Ok(AccountField::Active),
			"external_id" | "externalid" => Ok(AccountField::ExternalId),
			other => Err(ProvisioningError::invalid_value(format!(
				"unknown target field '{other}'"
			))),
		}
	}
}

const DEFAULT_MAPPINGS: &[(&str, AccountField)] = &[
	("username", AccountField::UserName),
	("displayname", AccountField::DisplayName),
	("name.formatted", AccountField::DisplayName),
	("name.givenname", AccountField::GivenName),
	("name.familyname", AccountField::FamilyName),
	("active", AccountField::Active),
	("externalid", AccountField::ExternalId),
	("emails", AccountField::Email),
	("emails.value", AccountField::Email),
	("emails[type eq \"work\"].value", AccountField::Email),
	("emails[primary eq true].value", AccountField::Email),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMap {
	paths: BTreeMap<String, AccountField>,
}

impl AttributeMap {
	pub fn defaults() -> Self {
		Self {
			paths: DEFAULT_MAPPINGS
				.iter()
				.map(|(path, field)| ((*path).to_string(), *field))
				.collect(),
		}
	}

	/// Tenant overrides layered on the defaults. Entries naming an unknown
	/// field are skipped.
	pub fn from_mappings(mappings: &[AttributeMapping]) -> Self {
		let mut map = Self::defaults();
		for mapping in mappings {
			match mapping.target_field.parse::<AccountField>() {
				Ok(field) => {
					map.paths.insert(normalize(&mapping.scim_path), field);
				}
				Err(_) => warn!(
					scim_path = %mapping.scim_path,
					target_field = %mapping.target_field,
					"skipping attribute mapping with unknown target field"
				),
			}
		}
		map
	}

	/// Rejects mappings that `from_mappings` would skip.
	pub fn validate_mappings(mappings: &[AttributeMapping]) -> Result<(), ProvisioningError> {
		for mapping in mappings {
			if mapping.scim_path.trim().is_empty() {
				return Err(ProvisioningError::invalid_path("attribute mapping path is empty"));
			}
			mapping.target_field.parse::<AccountField>()?;
		}
		Ok(())
	}

	pub fn resolve(&self, path: &str) -> Option<AccountField> {
		self.paths.get(&normalize(path)).copied()
	}

	pub fn to_mappings(&self) -> Vec<AttributeMapping> {
		self.paths
			.iter()
			.map(|(path, field)| AttributeMapping {
				scim_path: path.clone(),
				target_field: field.as_str().to_string(),
			})
			.collect()
	}
}

impl Default for AttributeMap {
	fn default() -> Self {
		Self::defaults()
	}
}

/// Lowercases, strips a schema URN and collapses whitespace inside filters.
fn normalize(path: &str) -> String {
	normalize_path(path)
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
}
