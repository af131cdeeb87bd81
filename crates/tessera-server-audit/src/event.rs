// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_server_auth::{TenantId, TokenId};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	UserCreated,
	UserUpdated,
	UserDeactivated,
	UserDeleted,
	GroupCreated,
	GroupUpdated,
	GroupDeleted,
	GroupMemberAdded,
	GroupMemberRemoved,
	BulkProcessed,
	AuthFailure,
	TokenIssued,
	TokenRotated,
	TokenRevoked,
	AttributeMappingsUpdated,
}

impl AuditEventType {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditEventType::UserCreated => "user_created",
			AuditEventType::UserUpdated => "user_updated",
			AuditEventType::UserDeactivated => "user_deactivated",
			AuditEventType::UserDeleted => "user_deleted",
			AuditEventType::GroupCreated => "group_created",
			AuditEventType::GroupUpdated => "group_updated",
			AuditEventType::GroupDeleted => "group_deleted",
			AuditEventType::GroupMemberAdded => "group_member_added",
			AuditEventType::GroupMemberRemoved => "group_member_removed",
			AuditEventType::BulkProcessed => "bulk_processed",
			AuditEventType::AuthFailure => "auth_failure",
			AuditEventType::TokenIssued => "token_issued",
			AuditEventType::TokenRotated => "token_rotated",
			AuditEventType::TokenRevoked => "token_revoked",
			AuditEventType::AttributeMappingsUpdated => "attribute_mappings_updated",
		}
	}

	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			AuditEventType::UserCreated
			| AuditEventType::UserUpdated
			| AuditEventType::GroupCreated
			| AuditEventType::GroupUpdated
			| AuditEventType::GroupMemberAdded
			| AuditEventType::GroupMemberRemoved
			| AuditEventType::BulkProcessed => AuditSeverity::Info,
			AuditEventType::UserDeactivated
			| AuditEventType::UserDeleted
			| AuditEventType::GroupDeleted
			| AuditEventType::TokenIssued
			| AuditEventType::TokenRotated
			| AuditEventType::TokenRevoked
			| AuditEventType::AttributeMappingsUpdated => AuditSeverity::Notice,
			AuditEventType::AuthFailure => AuditSeverity::Warning,
		}
	}
}

impl fmt::Display for AuditEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// RFC 5424 severity. Lower numeric value is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
	Warning = 4,
	Error = 3,
	Critical = 2,
}

impl PartialOrd for AuditSeverity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditSeverity {
	fn cmp(&self, other: &Self) -> Ordering {
		(*other as u8).cmp(&(*self as u8))
	}
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Debug => "debug",
			AuditSeverity::Info => "info",
			AuditSeverity::Notice => "notice",
			AuditSeverity::Warning => "warning",
			AuditSeverity::Error => "error",
			AuditSeverity::Critical => "critical",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
	Success,
	Failure,
}

impl AuditOutcome {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditOutcome::Success => "success",
			AuditOutcome::Failure => "failure",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event_type: AuditEventType,
	pub severity: AuditSeverity,
	pub outcome: AuditOutcome,
	pub tenant_id: Option<TenantId>,
	pub token_id: Option<TokenId>,
	pub resource_type: Option<String>,
	pub resource_id: Option<String>,
	pub action: String,
	pub details: serde_json::Value,
	pub request_id: Option<String>,
}

impl AuditLogEntry {
	pub fn builder(event_type: AuditEventType) -> AuditLogBuilder {
		AuditLogBuilder::new(event_type)
	}
}

pub struct AuditLogBuilder {
	event_type: AuditEventType,
	severity: Option<AuditSeverity>,
	outcome: AuditOutcome,
	tenant_id: Option<TenantId>,
	token_id: Option<TokenId>,
	resource_type: Option<String>,
	resource_id: Option<String>,
	action: Option<String>,
	details: serde_json::Value,
	request_id: Option<String>,
}

impl AuditLogBuilder {
	pub fn new(event_type: AuditEventType) -> Self {
		Self {
			event_type,
			severity: None,
			outcome: AuditOutcome::Success,
			tenant_id: None,
			token_id: None,
			resource_type: None,
			resource_id: None,
			action: None,
			details: serde_json::Value::Null,
			request_id: None,
		}
	}

	/// Defaults to the event type's severity.
	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.severity = Some(severity);
		self
	}

	pub fn failed(mut self) -> Self {
		self.outcome = AuditOutcome::Failure;
		self
	}

	pub fn tenant(mut self, tenant_id: TenantId) -> Self {
		self.tenant_id = Some(tenant_id);
		self
	}

	pub fn token(mut self, token_id: TokenId) -> Self {
		self.token_id = Some(token_id);
		self
	}

	pub fn resource(
		mut self,
		resource_type: impl Into<String>,
		resource_id: impl Into<String>,
	) -> Self {
		self.resource_type = Some(resource_type.into());
		self.resource_id = Some(resource_id.into());
		self
	}

	pub fn action(mut self, action: impl Into<String>) -> Self {
		self.action = Some(action.into());
		self
	}

	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = Some(request_id.into());
		self
	}

	pub fn build(self) -> AuditLogEntry {
		AuditLogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			event_type: self.event_type,
			severity: self
				.severity
				.unwrap_or_else(|| self.event_type.default_severity()),
			outcome: self.outcome,
			tenant_id: self.tenant_id,
			token_id: self.token_id,
			resource_type: self.resource_type,
			resource_id: self.resource_id,
			action: self.action.unwrap_or_else(|| self.event_type.to_string()),
			details: self.details,
			request_id: self.request_id,
		}
	}
}
