// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use argon2::password_hash::{
	rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::argon2_config::argon2_instance;
use crate::error::TokenError;
use crate::secret::TokenSecret;
use crate::types::{ProvisioningScope, TenantId, TokenId};

/// Random bytes per token (43 base64url characters).
pub const TOKEN_BYTES: usize = 32;

/// Characters of the encoded token stored in clear for lookup.
pub const TOKEN_PREFIX_LEN: usize = 8;

/// A persisted provisioning token. The plaintext is never part of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningToken {
	pub id: TokenId,
	pub tenant_id: TenantId,
	pub name: String,
	pub prefix: String,
	#[serde(skip_serializing, default)]
	pub token_hash: String,
	pub scopes: Vec<ProvisioningScope>,
	pub created_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub revoked_at: Option<DateTime<Utc>>,
	pub rotated_at: Option<DateTime<Utc>>,
}

impl ProvisioningToken {
	/// Build a new record and its plaintext. The plaintext is returned only here.
	pub fn issue(
		tenant_id: TenantId,
		name: impl Into<String>,
		scopes: Vec<ProvisioningScope>,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<(Self, TokenSecret), TokenError> {
		let secret = generate_token_secret();
		let token_hash = hash_token(secret.expose())?;
		let prefix = lookup_prefix(secret.expose())
			.ok_or_else(|| TokenError::Hash("generated token too short".to_string()))?
			.to_string();

		let token = Self {
			id: TokenId::generate(),
			tenant_id,
			name: name.into(),
			prefix,
			token_hash,
			scopes,
			created_at: Utc::now(),
			expires_at,
			last_used_at: None,
			revoked_at: None,
			rotated_at: None,
		};
		Ok((token, secret))
	}

	/// Replace the secret in place, keeping id, tenant, scopes and expiry.
	pub fn rotate_secret(&mut self) -> Result<TokenSecret, TokenError> {
		let secret = generate_token_secret();
		self.token_hash = hash_token(secret.expose())?;
		self.prefix = lookup_prefix(secret.expose())
			.ok_or_else(|| TokenError::Hash("generated token too short".to_string()))?
			.to_string();
		self.rotated_at = Some(Utc::now());
		Ok(secret)
	}

	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|exp| exp <= now)
	}

	pub fn has_scope(&self, scope: ProvisioningScope) -> bool {
		ProvisioningScope::is_granted(&self.scopes, scope)
	}

	/// Checks the lookup prefix in constant time, then the Argon2 hash.
	pub fn verify(&self, plaintext: &str) -> bool {
		let Some(candidate) = lookup_prefix(plaintext) else {
			return false;
		};
		if !bool::from(candidate.as_bytes().ct_eq(self.prefix.as_bytes())) {
			return false;
		}
		verify_token(plaintext, &self.token_hash)
	}
}

pub fn generate_token_secret() -> TokenSecret {
	let mut bytes = [0u8; TOKEN_BYTES];
	rand::thread_rng().fill_bytes(&mut bytes);
	TokenSecret::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// The lookup prefix of a presented token, or `None` when it is too short.
pub fn lookup_prefix(plaintext: &str) -> Option<&str> {
	plaintext.get(..TOKEN_PREFIX_LEN)
}

pub fn hash_token(plaintext: &str) -> Result<String, TokenError> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(plaintext.as_bytes(), &salt)
		.map(|h| h.to_string())
		.map_err(|e| TokenError::Hash(e.to_string()))
}

pub fn verify_token(plaintext: &str, hash: &str) -> bool {
	let Ok(parsed) = PasswordHash::new(hash) else {
		return false;
	};
	argon2_instance()
		.verify_password(plaintext.as_bytes(), &parsed)
		.is_ok()
}
