// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema definitions served by `GET /Schemas`.

use serde::{Deserialize, Serialize};

use crate::resource::{SCHEMA_CORE_GROUP, SCHEMA_CORE_USER, SCHEMA_ENTERPRISE_USER};

pub const SCHEMA_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Schema";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAttribute {
	pub name: String,
	#[serde(rename = "type")]
	pub attr_type: String,
	pub multi_valued: bool,
	pub required: bool,
	pub case_exact: bool,
	pub mutability: String,
	pub returned: String,
	pub uniqueness: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub sub_attributes: Vec<SchemaAttribute>,
}

impl SchemaAttribute {
	fn of_type(name: &str, attr_type: &str) -> Self {
		Self {
			name: name.to_string(),
			attr_type: attr_type.to_string(),
			multi_valued: false,
			required: false,
			case_exact: false,
			mutability: "readWrite".to_string(),
			returned: "default".to_string(),
			uniqueness: "none".to_string(),
			sub_attributes: Vec::new(),
		}
	}

	pub fn string(name: &str) -> Self {
		Self::of_type(name, "string")
	}

	pub fn boolean(name: &str) -> Self {
		Self::of_type(name, "boolean")
	}

	pub fn complex(name: &str, sub_attributes: Vec<SchemaAttribute>) -> Self {
		Self {
			sub_attributes,
			..Self::of_type(name, "complex")
		}
	}

	pub fn reference(name: &str) -> Self {
		Self::of_type(name, "reference")
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	pub fn multi_valued(mut self) -> Self {
		self.multi_valued = true;
		self
	}

	pub fn read_only(mut self) -> Self {
		self.mutability = "readOnly".to_string();
		self
	}

	pub fn server_unique(mut self) -> Self {
		self.uniqueness = "server".to_string();
		self
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
	pub schemas: Vec<String>,
	pub id: String,
	pub name: String,
	pub description: String,
	pub attributes: Vec<SchemaAttribute>,
}

impl Schema {
	fn new(id: &str, name: &str, description: &str, attributes: Vec<SchemaAttribute>) -> Self {
		Self {
			schemas: vec![SCHEMA_SCHEMA.to_string()],
			id: id.to_string(),
			name: name.to_string(),
			description: description.to_string(),
			attributes,
		}
	}

	pub fn user() -> Self {
		Self::new(
			SCHEMA_CORE_USER,
			"User",
			"User Account",
			vec![
				SchemaAttribute::string("userName").required().server_unique(),
				SchemaAttribute::string("externalId"),
				SchemaAttribute::complex(
					"name",
					vec![
						SchemaAttribute::string("formatted"),
						SchemaAttribute::string("familyName"),
						SchemaAttribute::string("givenName"),
					],
				),
				SchemaAttribute::string("displayName"),
				SchemaAttribute::boolean("active"),
				SchemaAttribute::complex(
					"emails",
					vec![
						SchemaAttribute::string("value"),
						SchemaAttribute::string("type"),
						SchemaAttribute::boolean("primary"),
					],
				)
				.multi_valued(),
				SchemaAttribute::complex(
					"groups",
					vec![
						SchemaAttribute::string("value").read_only(),
						SchemaAttribute::reference("$ref").read_only(),
						SchemaAttribute::string("display").read_only(),
					],
				)
				.multi_valued()
				.read_only(),
			],
		)
	}

	pub fn enterprise_user() -> Self {
		Self::new(
			SCHEMA_ENTERPRISE_USER,
			"EnterpriseUser",
			"Enterprise User",
			vec![
				SchemaAttribute::string("employeeNumber"),
				SchemaAttribute::string("department"),
				SchemaAttribute::string("organization"),
			],
		)
	}

	pub fn group() -> Self {
		Self::new(
			SCHEMA_CORE_GROUP,
			"Group",
			"Group",
			vec![
				SchemaAttribute::string("displayName").required(),
				SchemaAttribute::string("externalId"),
				SchemaAttribute::complex(
					"members",
					vec![
						SchemaAttribute::string("value"),
						SchemaAttribute::reference("$ref"),
						SchemaAttribute::string("display"),
					],
				)
				.multi_valued(),
			],
		)
	}

	pub fn all() -> Vec<Self> {
		vec![Self::user(), Self::enterprise_user(), Self::group()]
	}

	pub fn find(id: &str) -> Option<Self> {
		Self::all().into_iter().find(|s| s.id == id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_schema_requires_user_name() {
		let schema = Schema::user();
		let user_name = schema.attributes.iter().find(|a| a.name == "userName").unwrap();
		assert!(user_name.required);
		assert_eq!(user_name.uniqueness, "server");
	}

	#[test]
	fn find_by_urn() {
		assert_eq!(Schema::find(SCHEMA_CORE_GROUP).unwrap().name, "Group");
		assert!(Schema::find("urn:unknown").is_none());
	}
}
