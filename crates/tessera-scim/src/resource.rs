// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User and Group resource representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_CORE_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const SCHEMA_ENTERPRISE_USER: &str =
	"urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";
pub const SCHEMA_CORE_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
	pub resource_type: String,
	pub created: DateTime<Utc>,
	pub last_modified: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<String>,
}

impl Meta {
	pub fn new(
		resource_type: &str,
		created: DateTime<Utc>,
		last_modified: DateTime<Utc>,
		location: Option<String>,
	) -> Self {
		Self {
			resource_type: resource_type.to_string(),
			created,
			last_modified,
			location,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub formatted: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub family_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub given_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimEmail {
	pub value: String,
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub email_type: Option<String>,
	#[serde(default)]
	pub primary: bool,
}

impl ScimEmail {
	pub fn work(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
			email_type: Some("work".to_string()),
			primary: true,
		}
	}
}

/// A read-only group reference carried on a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReference {
	pub value: String,
	#[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
	pub ref_: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
	#[serde(default = "user_schemas")]
	pub schemas: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub external_id: Option<String>,
	#[serde(default)]
	pub user_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<Name>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	#[serde(default = "default_active")]
	pub active: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub emails: Vec<ScimEmail>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub groups: Vec<GroupReference>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta: Option<Meta>,
}

fn default_active() -> bool {
	true
}

fn user_schemas() -> Vec<String> {
	vec![SCHEMA_CORE_USER.to_string()]
}

fn group_schemas() -> Vec<String> {
	vec![SCHEMA_CORE_GROUP.to_string()]
}

impl ScimUser {
	pub fn new(user_name: impl Into<String>) -> Self {
		Self {
			schemas: user_schemas(),
			id: None,
			external_id: None,
			user_name: user_name.into(),
			name: None,
			display_name: None,
			active: true,
			emails: Vec::new(),
			groups: Vec::new(),
			meta: None,
		}
	}

	/// The address used as the canonical backend email.
	///
	/// Prefers the entry flagged primary, then the first entry, then the
	/// userName when it looks like an address.
	pub fn canonical_email(&self) -> Option<&str> {
		self.emails
			.iter()
			.find(|e| e.primary)
			.or_else(|| self.emails.first())
			.map(|e| e.value.as_str())
			.or_else(|| {
				if self.user_name.contains('@') {
					Some(self.user_name.as_str())
				} else {
					None
				}
			})
			.filter(|v| !v.trim().is_empty())
	}

	/// Display name, falling back to the formatted or composed name.
	pub fn resolved_display_name(&self) -> Option<String> {
		if let Some(dn) = self.display_name.as_ref().filter(|s| !s.is_empty()) {
			return Some(dn.clone());
		}
		let name = self.name.as_ref()?;
		if let Some(formatted) = name.formatted.as_ref().filter(|s| !s.is_empty()) {
			return Some(formatted.clone());
		}
		let composed = [name.given_name.as_deref(), name.family_name.as_deref()]
			.into_iter()
			.flatten()
			.collect::<Vec<_>>()
			.join(" ");
		(!composed.is_empty()).then_some(composed)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
	pub value: String,
	#[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
	pub ref_: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display: Option<String>,
}

impl GroupMember {
	pub fn new(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
			ref_: None,
			display: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroup {
	#[serde(default = "group_schemas")]
	pub schemas: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub external_id: Option<String>,
	#[serde(default)]
	pub display_name: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub members: Vec<GroupMember>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta: Option<Meta>,
}

impl ScimGroup {
	pub fn new(display_name: impl Into<String>) -> Self {
		Self {
			schemas: group_schemas(),
			id: None,
			external_id: None,
			display_name: display_name.into(),
			members: Vec::new(),
			meta: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_deserializes_with_defaults() {
		let user: ScimUser = serde_json::from_str(r#"{"userName":"alice@example.com"}"#).unwrap();
		assert!(user.active);
		assert_eq!(user.schemas, vec![SCHEMA_CORE_USER.to_string()]);
		assert_eq!(user.canonical_email(), Some("alice@example.com"));
	}

	#[test]
	fn canonical_email_prefers_primary() {
		let mut user = ScimUser::new("alice");
		user.emails = vec![
			ScimEmail {
				value: "home@example.com".to_string(),
				email_type: Some("home".to_string()),
				primary: false,
			},
			ScimEmail::work("work@example.com"),
		];
		assert_eq!(user.canonical_email(), Some("work@example.com"));
	}

	#[test]
	fn canonical_email_none_without_address() {
		let user = ScimUser::new("alice");
		assert_eq!(user.canonical_email(), None);
	}

	#[test]
	fn display_name_composed_from_name_parts() {
		let mut user = ScimUser::new("alice");
		user.name = Some(Name {
			formatted: None,
			given_name: Some("Alice".to_string()),
			family_name: Some("Liddell".to_string()),
		});
		assert_eq!(user.resolved_display_name().as_deref(), Some("Alice Liddell"));
	}

	#[test]
	fn group_member_ref_uses_dollar_key() {
		let member: GroupMember =
			serde_json::from_str(r#"{"value":"u1","$ref":"https://x/Users/u1"}"#).unwrap();
		assert_eq!(member.ref_.as_deref(), Some("https://x/Users/u1"));
	}
}
