// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

#[derive(Debug, Error)]
pub enum ScimError {
	#[error("invalid value: {0}")]
	InvalidValue(String),
	#[error("invalid syntax: {0}")]
	InvalidSyntax(String),
	#[error("invalid path: {0}")]
	InvalidPath(String),
	#[error("too many operations: {count} exceeds {max}")]
	TooMany { count: usize, max: usize },
}

impl ScimError {
	pub fn error_type(&self) -> ScimErrorType {
		match self {
			ScimError::InvalidValue(_) => ScimErrorType::InvalidValue,
			ScimError::InvalidSyntax(_) => ScimErrorType::InvalidSyntax,
			ScimError::InvalidPath(_) => ScimErrorType::InvalidPath,
			ScimError::TooMany { .. } => ScimErrorType::TooMany,
		}
	}
}

/// The `scimType` keyword carried by 400/409/413 error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScimErrorType {
	InvalidFilter,
	TooMany,
	Uniqueness,
	Mutability,
	InvalidSyntax,
	InvalidPath,
	NoTarget,
	InvalidValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimErrorResponse {
	pub schemas: Vec<String>,
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scim_type: Option<ScimErrorType>,
	pub detail: String,
}

impl ScimErrorResponse {
	pub fn new(status: u16, scim_type: Option<ScimErrorType>, detail: impl Into<String>) -> Self {
		Self {
			schemas: vec![SCHEMA_ERROR.to_string()],
			status: status.to_string(),
			scim_type,
			detail: detail.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_response_serializes_scim_type_in_camel_case() {
		let resp = ScimErrorResponse::new(409, Some(ScimErrorType::Uniqueness), "duplicate");
		let json = serde_json::to_value(&resp).unwrap();
		assert_eq!(json["schemas"][0], SCHEMA_ERROR);
		assert_eq!(json["status"], "409");
		assert_eq!(json["scimType"], "uniqueness");
	}

	#[test]
	fn error_response_omits_missing_scim_type() {
		let resp = ScimErrorResponse::new(404, None, "gone");
		let json = serde_json::to_value(&resp).unwrap();
		assert!(json.get("scimType").is_none());
	}
}
