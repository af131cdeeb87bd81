// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Issue, validate, rotate and revoke provisioning tokens.
//!
//! Every rejected token produces the same [`ProvisioningError::Authentication`].
//! The specific reason only reaches metrics, logs and the audit trail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tessera_server_audit::{AuditEventType, AuditLogEntry};
use tessera_server_auth::{
	lookup_prefix, ProvisioningScope, ProvisioningToken, TokenId, TokenSecret,
};
use tessera_server_db::TokenStore;
use tracing::{info, instrument, warn};

use crate::context::RequestContext;
use crate::error::{ProvisioningError, Result};
use crate::metrics::ProvisioningMetrics;
use crate::side_effects::SideEffects;

/// A freshly issued or rotated token. `secret` is never retrievable again.
#[derive(Debug)]
pub struct IssuedToken {
	pub token: ProvisioningToken,
	pub secret: TokenSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
	TooShort,
	NotFound,
	HashMismatch,
	Revoked,
	Expired,
}

impl RejectReason {
	pub fn label(&self) -> &'static str {
		match self {
			RejectReason::TooShort => "too_short",
			RejectReason::NotFound => "not_found",
			RejectReason::HashMismatch => "hash_mismatch",
			RejectReason::Revoked => "revoked",
			RejectReason::Expired => "expired",
		}
	}
}

pub struct TokenAuthority {
	store: Arc<dyn TokenStore>,
	metrics: Arc<ProvisioningMetrics>,
	side_effects: SideEffects,
}

impl TokenAuthority {
	pub fn new(store: Arc<dyn TokenStore>, metrics: Arc<ProvisioningMetrics>, side_effects: SideEffects) -> Self {
		Self {
			store,
			metrics,
			side_effects,
		}
	}

	/// Empty `scopes` grants the protocol defaults (everything but admin).
	#[instrument(skip(self, ctx, scopes), fields(tenant_id = %ctx.tenant_id))]
	pub async fn issue(
		&self,
		ctx: &RequestContext,
		name: &str,
		scopes: Vec<ProvisioningScope>,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<IssuedToken> {
		ctx.require(ProvisioningScope::Admin)?;
		let name = name.trim();
		if name.is_empty() {
			return Err(ProvisioningError::invalid_value("token name must not be empty"));
		}
		if expires_at.is_some_and(|exp| exp <= Utc::now()) {
			return Err(ProvisioningError::invalid_value("token expiry must be in the future"));
		}
		let scopes = if scopes.is_empty() {
			ProvisioningScope::protocol_defaults()
		} else {
			scopes
		};

		let (token, secret) = ProvisioningToken::issue(ctx.tenant_id, name, scopes, expires_at)?;
		ctx.run(self.store.insert_token(&token)).await?;

		info!(token_id = %token.id, "provisioning token issued");
		self.side_effects.audit(
			AuditLogEntry::builder(AuditEventType::TokenIssued)
				.tenant(ctx.tenant_id)
				.resource("token", token.id.to_string())
				.details(json!({ "name": token.name, "scopes": token.scopes }))
				.request_id(ctx.request_id.clone())
				.build(),
		);
		Ok(IssuedToken { token, secret })
	}

	/// Resolves a presented bearer token to its record.
	#[instrument(skip_all)]
	pub async fn validate(&self, plaintext: &str) -> Result<ProvisioningToken> {
		let token = match self.check(plaintext).await? {
			Ok(token) => token,
			Err((reason, token)) => {
				self.reject(reason, token.as_ref());
				return Err(ProvisioningError::Authentication);
			}
		};

		if let Err(e) = self.store.touch_last_used(&token.id, Utc::now()).await {
			warn!(token_id = %token.id, error = %e, "failed to record token use");
		}
		Ok(token)
	}

	/// Outer error is a store failure; inner error is a rejection.
	async fn check(
		&self,
		plaintext: &str,
	) -> Result<std::result::Result<ProvisioningToken, (RejectReason, Option<ProvisioningToken>)>> {
		let Some(prefix) = lookup_prefix(plaintext) else {
			return Ok(Err((RejectReason::TooShort, None)));
		};

		let candidates = self.store.find_tokens_by_prefix(prefix).await?;
		if candidates.is_empty() {
			return Ok(Err((RejectReason::NotFound, None)));
		}

		let Some(token) = candidates.into_iter().find(|t| t.verify(plaintext)) else {
			return Ok(Err((RejectReason::HashMismatch, None)));
		};
		if token.is_revoked() {
			return Ok(Err((RejectReason::Revoked, Some(token))));
		}
		if token.is_expired_at(Utc::now()) {
			return Ok(Err((RejectReason::Expired, Some(token))));
		}
		Ok(Ok(token))
	}

	fn reject(&self, reason: RejectReason, token: Option<&ProvisioningToken>) {
		self.metrics.record_auth_failure(reason.label());
		warn!(
			reason = reason.label(),
			token_id = ?token.map(|t| t.id),
			"provisioning token rejected"
		);

		let mut entry = AuditLogEntry::builder(AuditEventType::AuthFailure)
			.details(json!({ "reason": reason.label() }))
			.failed();
		if let Some(token) = token {
			entry = entry.tenant(token.tenant_id).token(token.id);
		}
		self.side_effects.audit(entry.build());
	}

	/// Replaces the secret, keeping id, scopes, expiry and tenant.
	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn rotate(&self, ctx: &RequestContext, id: &TokenId) -> Result<IssuedToken> {
		ctx.require(ProvisioningScope::Admin)?;
		let mut token = self.owned(ctx, id).await?;
		if token.is_revoked() {
			return Err(ProvisioningError::Conflict(format!("token {id} is revoked")));
		}

		let secret = token.rotate_secret()?;
		let rotated_at = token.rotated_at.unwrap_or_else(Utc::now);
		let replaced = ctx
			.run(self.store.replace_secret(id, &token.prefix, &token.token_hash, rotated_at))
			.await?;
		if !replaced {
			return Err(ProvisioningError::Conflict(format!("token {id} is revoked")));
		}

		info!(token_id = %id, "provisioning token rotated");
		self.side_effects.audit(
			AuditLogEntry::builder(AuditEventType::TokenRotated)
				.tenant(ctx.tenant_id)
				.resource("token", id.to_string())
				.request_id(ctx.request_id.clone())
				.build(),
		);
		Ok(IssuedToken { token, secret })
	}

	/// Idempotent.
	#[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
	pub async fn revoke(&self, ctx: &RequestContext, id: &TokenId) -> Result<()> {
		ctx.require(ProvisioningScope::Admin)?;
		self.owned(ctx, id).await?;
		if ctx.run(self.store.revoke_token(id, Utc::now())).await? {
			self.side_effects.audit(
				AuditLogEntry::builder(AuditEventType::TokenRevoked)
					.tenant(ctx.tenant_id)
					.resource("token", id.to_string())
					.request_id(ctx.request_id.clone())
					.build(),
			);
		}
		Ok(())
	}

	pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<ProvisioningToken>> {
		ctx.require(ProvisioningScope::Admin)?;
		ctx.run(self.store.list_tokens(&ctx.tenant_id)).await
	}

	/// Tokens of other tenants are reported as missing.
	async fn owned(&self, ctx: &RequestContext, id: &TokenId) -> Result<ProvisioningToken> {
		match ctx.run(self.store.get_token(id)).await? {
			Some(token) if token.tenant_id == ctx.tenant_id => Ok(token),
			_ => Err(ProvisioningError::NotFound(format!("token {id}"))),
		}
	}
}
