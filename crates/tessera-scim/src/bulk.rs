// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types for `POST /Bulk`.

use serde::{Deserialize, Serialize};

pub const SCHEMA_BULK_REQUEST: &str = "urn:ietf:params:scim:api:messages:2.0:BulkRequest";
pub const SCHEMA_BULK_RESPONSE: &str = "urn:ietf:params:scim:api:messages:2.0:BulkResponse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulkMethod {
	#[serde(rename = "POST", alias = "post", alias = "Post")]
	Post,
	#[serde(rename = "PUT", alias = "put", alias = "Put")]
	Put,
	#[serde(rename = "PATCH", alias = "patch", alias = "Patch")]
	Patch,
	#[serde(rename = "DELETE", alias = "delete", alias = "Delete")]
	Delete,
}

impl std::fmt::Display for BulkMethod {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			BulkMethod::Post => "POST",
			BulkMethod::Put => "PUT",
			BulkMethod::Patch => "PATCH",
			BulkMethod::Delete => "DELETE",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
	#[serde(default)]
	pub schemas: Vec<String>,
	/// Number of failures after which processing stops. Absent means never.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fail_on_errors: Option<usize>,
	#[serde(rename = "Operations")]
	pub operations: Vec<BulkOperationRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationRequest {
	pub method: BulkMethod,
	pub path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bulk_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationResponse {
	pub method: BulkMethod,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bulk_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<String>,
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response: Option<serde_json::Value>,
}

impl BulkOperationResponse {
	pub fn status_code(&self) -> u16 {
		self.status.parse().unwrap_or(500)
	}

	pub fn is_failure(&self) -> bool {
		self.status_code() >= 400
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponse {
	pub schemas: Vec<String>,
	#[serde(rename = "Operations")]
	pub operations: Vec<BulkOperationResponse>,
}

impl BulkResponse {
	pub fn new(operations: Vec<BulkOperationResponse>) -> Self {
		Self {
			schemas: vec![SCHEMA_BULK_RESPONSE.to_string()],
			operations,
		}
	}
}
