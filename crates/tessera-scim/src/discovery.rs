// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ServiceProviderConfig and ResourceType documents.

use serde::{Deserialize, Serialize};

use crate::resource::{SCHEMA_CORE_GROUP, SCHEMA_CORE_USER, SCHEMA_ENTERPRISE_USER};

pub const SCHEMA_SERVICE_PROVIDER_CONFIG: &str =
	"urn:ietf:params:scim:schemas:core:2.0:ServiceProviderConfig";
pub const SCHEMA_RESOURCE_TYPE: &str = "urn:ietf:params:scim:schemas:core:2.0:ResourceType";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationScheme {
	#[serde(rename = "type")]
	pub scheme_type: String,
	pub name: String,
	pub description: String,
	pub primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supported {
	pub supported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSupported {
	pub supported: bool,
	pub max_operations: usize,
	pub max_payload_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSupported {
	pub supported: bool,
	pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProviderConfig {
	pub schemas: Vec<String>,
	pub patch: Supported,
	pub bulk: BulkSupported,
	pub filter: FilterSupported,
	pub change_password: Supported,
	pub sort: Supported,
	pub etag: Supported,
	pub authentication_schemes: Vec<AuthenticationScheme>,
}

impl ServiceProviderConfig {
	pub fn new(max_bulk_operations: usize, max_bulk_payload: usize, max_results: usize) -> Self {
		Self {
			schemas: vec![SCHEMA_SERVICE_PROVIDER_CONFIG.to_string()],
			patch: Supported { supported: true },
			bulk: BulkSupported {
				supported: true,
				max_operations: max_bulk_operations,
				max_payload_size: max_bulk_payload,
			},
			filter: FilterSupported {
				supported: true,
				max_results,
			},
			change_password: Supported { supported: false },
			sort: Supported { supported: false },
			etag: Supported { supported: false },
			authentication_schemes: vec![AuthenticationScheme {
				scheme_type: "oauthbearertoken".to_string(),
				name: "OAuth Bearer Token".to_string(),
				description: "Authentication using a provisioning bearer token".to_string(),
				primary: true,
			}],
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaExtension {
	pub schema: String,
	pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
	pub schemas: Vec<String>,
	pub id: String,
	pub name: String,
	pub description: String,
	pub endpoint: String,
	pub schema: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub schema_extensions: Vec<SchemaExtension>,
}

impl ResourceType {
	pub fn user() -> Self {
		Self {
			schemas: vec![SCHEMA_RESOURCE_TYPE.to_string()],
			id: "User".to_string(),
			name: "User".to_string(),
			description: "User Account".to_string(),
			endpoint: "/Users".to_string(),
			schema: SCHEMA_CORE_USER.to_string(),
			schema_extensions: vec![SchemaExtension {
				schema: SCHEMA_ENTERPRISE_USER.to_string(),
				required: false,
			}],
		}
	}

	pub fn group() -> Self {
		Self {
			schemas: vec![SCHEMA_RESOURCE_TYPE.to_string()],
			id: "Group".to_string(),
			name: "Group".to_string(),
			description: "Group".to_string(),
			endpoint: "/Groups".to_string(),
			schema: SCHEMA_CORE_GROUP.to_string(),
			schema_extensions: Vec::new(),
		}
	}

	pub fn all() -> Vec<Self> {
		vec![Self::user(), Self::group()]
	}

	pub fn find(id: &str) -> Option<Self> {
		Self::all().into_iter().find(|r| r.id.eq_ignore_ascii_case(id))
	}
}
