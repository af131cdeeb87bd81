// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::error::ScimError;

pub const SCHEMA_PATCH_OP: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOp {
	#[serde(alias = "Add", alias = "ADD", rename = "add")]
	Add,
	#[serde(alias = "Remove", alias = "REMOVE", rename = "remove")]
	Remove,
	#[serde(alias = "Replace", alias = "REPLACE", rename = "replace")]
	Replace,
}

impl std::fmt::Display for PatchOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			PatchOp::Add => write!(f, "add"),
			PatchOp::Remove => write!(f, "remove"),
			PatchOp::Replace => write!(f, "replace"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
	pub op: PatchOp,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<serde_json::Value>,
}

impl PatchOperation {
	pub fn new(op: PatchOp, path: Option<&str>, value: Option<serde_json::Value>) -> Self {
		Self {
			op,
			path: path.map(str::to_string),
			value,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRequest {
	#[serde(default)]
	pub schemas: Vec<String>,
	#[serde(rename = "Operations")]
	pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
	pub fn new(operations: Vec<PatchOperation>) -> Self {
		Self {
			schemas: vec![SCHEMA_PATCH_OP.to_string()],
			operations,
		}
	}

	/// Structural checks only. Path semantics are resolved by the patch engine.
	pub fn validate(&self) -> Result<(), ScimError> {
		if !self.schemas.iter().any(|s| s == SCHEMA_PATCH_OP) {
			return Err(ScimError::InvalidSyntax("missing PatchOp schema".to_string()));
		}
		if self.operations.is_empty() {
			return Err(ScimError::InvalidSyntax("no operations supplied".to_string()));
		}
		for op in &self.operations {
			match op.op {
				PatchOp::Remove if op.path.as_deref().map_or(true, str::is_empty) => {
					return Err(ScimError::InvalidPath("remove requires a path".to_string()));
				}
				PatchOp::Add | PatchOp::Replace if op.value.is_none() => {
					return Err(ScimError::InvalidValue(format!("{} requires a value", op.op)));
				}
				_ => {}
			}
		}
		Ok(())
	}
}
