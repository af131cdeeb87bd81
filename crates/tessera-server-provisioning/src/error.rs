// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_scim::{ScimError, ScimErrorResponse, ScimErrorType};
use tessera_server_auth::TokenError;
use tessera_server_db::DbError;

use crate::identity::IdentityError;
use crate::org_adapter::OrgAdapterError;

/// Detail returned for every authentication failure, whatever the cause.
pub const AUTHENTICATION_DETAIL: &str = "invalid or expired token";

/// Errors surfaced by the provisioning engine.
///
/// This is the only error type that crosses into the HTTP layer. Component
/// errors convert into it; `to_scim_response` is the single translation into
/// the protocol error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
	#[error("authentication failed")]
	Authentication,

	#[error("forbidden: {0}")]
	Authorization(String),

	#[error("{message}")]
	Validation {
		scim_type: ScimErrorType,
		message: String,
	},

	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("rate limit exceeded: {limit} requests per second")]
	RateLimited { limit: u32 },

	#[error("payload too large: {0}")]
	PayloadTooLarge(String),

	#[error("request cancelled")]
	Cancelled,

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;

impl ProvisioningError {
	pub fn invalid_value(message: impl Into<String>) -> Self {
		Self::Validation {
			scim_type: ScimErrorType::InvalidValue,
			message: message.into(),
		}
	}

	pub fn invalid_syntax(message: impl Into<String>) -> Self {
		Self::Validation {
			scim_type: ScimErrorType::InvalidSyntax,
			message: message.into(),
		}
	}

	pub fn invalid_path(message: impl Into<String>) -> Self {
		Self::Validation {
			scim_type: ScimErrorType::InvalidPath,
			message: message.into(),
		}
	}

	pub fn status_code(&self) -> u16 {
		match self {
			Self::Authentication => 401,
			Self::Authorization(_) => 403,
			Self::Validation { .. } => 400,
			Self::NotFound(_) => 404,
			Self::Conflict(_) => 409,
			Self::RateLimited { .. } => 429,
			Self::PayloadTooLarge(_) => 413,
			Self::Cancelled => 503,
			Self::Internal(_) => 500,
		}
	}

	pub fn scim_type(&self) -> Option<ScimErrorType> {
		match self {
			Self::Validation { scim_type, .. } => Some(*scim_type),
			Self::Conflict(_) => Some(ScimErrorType::Uniqueness),
			Self::PayloadTooLarge(_) => Some(ScimErrorType::TooMany),
			_ => None,
		}
	}

	/// Short label for metrics and logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Authentication => "authentication",
			Self::Authorization(_) => "authorization",
			Self::Validation { .. } => "validation",
			Self::NotFound(_) => "not_found",
			Self::Conflict(_) => "conflict",
			Self::RateLimited { .. } => "rate_limited",
			Self::PayloadTooLarge(_) => "payload_too_large",
			Self::Cancelled => "cancelled",
			Self::Internal(_) => "internal",
		}
	}

	/// The protocol error envelope. Internal detail is withheld.
	pub fn to_scim_response(&self) -> ScimErrorResponse {
		let detail = match self {
			Self::Authentication => AUTHENTICATION_DETAIL.to_string(),
			Self::Internal(_) => "internal server error".to_string(),
			other => other.to_string(),
		};
		ScimErrorResponse::new(self.status_code(), self.scim_type(), detail)
	}
}

impl From<ScimError> for ProvisioningError {
	fn from(e: ScimError) -> Self {
		match e {
			ScimError::TooMany { .. } => Self::PayloadTooLarge(e.to_string()),
			other => Self::Validation {
				scim_type: other.error_type(),
				message: other.to_string(),
			},
		}
	}
}

impl From<DbError> for ProvisioningError {
	fn from(e: DbError) -> Self {
		match e {
			DbError::NotFound(msg) => Self::NotFound(msg),
			DbError::Conflict(msg) => Self::Conflict(msg),
			other => Self::Internal(other.to_string()),
		}
	}
}

impl From<IdentityError> for ProvisioningError {
	fn from(e: IdentityError) -> Self {
		match e {
			IdentityError::NotFound(id) => Self::NotFound(format!("account {id}")),
			IdentityError::Conflict(msg) => Self::Conflict(msg),
			IdentityError::Unavailable(msg) => Self::Internal(format!("identity store: {msg}")),
		}
	}
}

impl From<OrgAdapterError> for ProvisioningError {
	fn from(e: OrgAdapterError) -> Self {
		match e {
			OrgAdapterError::NotFound(msg) => Self::NotFound(msg),
			OrgAdapterError::Conflict(msg) => Self::Conflict(msg),
			OrgAdapterError::Backend(msg) => Self::Internal(format!("organization backend: {msg}")),
		}
	}
}

impl From<TokenError> for ProvisioningError {
	fn from(e: TokenError) -> Self {
		match e {
			TokenError::UnknownScope(scope) => Self::invalid_value(format!("unknown scope '{scope}'")),
			TokenError::Hash(msg) => Self::Internal(format!("token hashing: {msg}")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn authentication_detail_is_generic() {
		let resp = ProvisioningError::Authentication.to_scim_response();
		assert_eq!(resp.status, "401");
		assert_eq!(resp.detail, AUTHENTICATION_DETAIL);
		assert!(resp.scim_type.is_none());
	}

	#[test]
	fn internal_detail_is_withheld() {
		let err = ProvisioningError::Internal("sqlite: disk I/O error at /var/db".to_string());
		let resp = err.to_scim_response();
		assert_eq!(resp.status, "500");
		assert!(!resp.detail.contains("sqlite"));
	}

	#[test]
	fn rate_limited_mentions_limit() {
		let resp = ProvisioningError::RateLimited { limit: 50 }.to_scim_response();
		assert_eq!(resp.status, "429");
		assert!(resp.detail.contains("50"));
	}

	#[test]
	fn scim_errors_map_to_validation_and_too_many() {
		let err: ProvisioningError = ScimError::InvalidPath("x".to_string()).into();
		assert_eq!(err.status_code(), 400);
		assert_eq!(err.scim_type(), Some(ScimErrorType::InvalidPath));

		let err: ProvisioningError = ScimError::TooMany { count: 2, max: 1 }.into();
		assert_eq!(err.status_code(), 413);
		assert_eq!(err.scim_type(), Some(ScimErrorType::TooMany));
	}

	#[test]
	fn db_conflict_is_uniqueness() {
		let err: ProvisioningError = DbError::Conflict("group mapping".to_string()).into();
		assert_eq!(err.status_code(), 409);
		assert_eq!(err.scim_type(), Some(ScimErrorType::Uniqueness));
	}
}
