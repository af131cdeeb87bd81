// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioning token persistence. Only hashes and lookup prefixes are stored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use tessera_server_auth::{ProvisioningScope, ProvisioningToken, TenantId, TokenId};

use crate::error::DbError;
use crate::row::{parse_id, parse_optional_timestamp, parse_timestamp};

#[async_trait]
pub trait TokenStore: Send + Sync {
	async fn insert_token(&self, token: &ProvisioningToken) -> Result<(), DbError>;
	/// Every token sharing a lookup prefix, revoked or not.
	async fn find_tokens_by_prefix(&self, prefix: &str) -> Result<Vec<ProvisioningToken>, DbError>;
	async fn get_token(&self, id: &TokenId) -> Result<Option<ProvisioningToken>, DbError>;
	async fn list_tokens(&self, tenant_id: &TenantId) -> Result<Vec<ProvisioningToken>, DbError>;
	/// Swap the secret of a live token. Returns false when the token is absent or revoked.
	async fn replace_secret(
		&self,
		id: &TokenId,
		prefix: &str,
		token_hash: &str,
		rotated_at: DateTime<Utc>,
	) -> Result<bool, DbError>;
	async fn revoke_token(&self, id: &TokenId, at: DateTime<Utc>) -> Result<bool, DbError>;
	async fn touch_last_used(&self, id: &TokenId, at: DateTime<Utc>) -> Result<(), DbError>;
}

#[derive(Clone)]
pub struct TokenRepository {
	pool: SqlitePool,
}

impl TokenRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const TOKEN_COLUMNS: &str = "id, tenant_id, name, prefix, token_hash, scopes, created_at, \
	expires_at, last_used_at, revoked_at, rotated_at";

#[async_trait]
impl TokenStore for TokenRepository {
	#[tracing::instrument(skip(self, token), fields(token_id = %token.id, tenant_id = %token.tenant_id))]
	async fn insert_token(&self, token: &ProvisioningToken) -> Result<(), DbError> {
		let scopes_json = serde_json::to_string(&token.scopes)?;

		sqlx::query(
			r#"
			INSERT INTO provisioning_tokens (
				id, tenant_id, name, prefix, token_hash, scopes, created_at,
				expires_at, last_used_at, revoked_at, rotated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(token.id.to_string())
		.bind(token.tenant_id.to_string())
		.bind(&token.name)
		.bind(&token.prefix)
		.bind(&token.token_hash)
		.bind(&scopes_json)
		.bind(token.created_at.to_rfc3339())
		.bind(token.expires_at.map(|t| t.to_rfc3339()))
		.bind(token.last_used_at.map(|t| t.to_rfc3339()))
		.bind(token.revoked_at.map(|t| t.to_rfc3339()))
		.bind(token.rotated_at.map(|t| t.to_rfc3339()))
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, "token"))?;

		tracing::debug!("provisioning token stored");
		Ok(())
	}

	#[tracing::instrument(skip(self, prefix))]
	async fn find_tokens_by_prefix(&self, prefix: &str) -> Result<Vec<ProvisioningToken>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {TOKEN_COLUMNS} FROM provisioning_tokens WHERE prefix = ?"
		))
		.bind(prefix)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_token_row).collect()
	}

	#[tracing::instrument(skip(self), fields(token_id = %id))]
	async fn get_token(&self, id: &TokenId) -> Result<Option<ProvisioningToken>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {TOKEN_COLUMNS} FROM provisioning_tokens WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_token_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn list_tokens(&self, tenant_id: &TenantId) -> Result<Vec<ProvisioningToken>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {TOKEN_COLUMNS} FROM provisioning_tokens WHERE tenant_id = ? \
			 ORDER BY created_at DESC"
		))
		.bind(tenant_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		let tokens = rows
			.iter()
			.map(parse_token_row)
			.collect::<Result<Vec<_>, _>>()?;
		tracing::debug!(count = tokens.len(), "listed provisioning tokens");
		Ok(tokens)
	}

	#[tracing::instrument(skip(self, prefix, token_hash), fields(token_id = %id))]
	async fn replace_secret(
		&self,
		id: &TokenId,
		prefix: &str,
		token_hash: &str,
		rotated_at: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE provisioning_tokens
			SET prefix = ?, token_hash = ?, rotated_at = ?
			WHERE id = ? AND revoked_at IS NULL
			"#,
		)
		.bind(prefix)
		.bind(token_hash)
		.bind(rotated_at.to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(token_id = %id))]
	async fn revoke_token(&self, id: &TokenId, at: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE provisioning_tokens
			SET revoked_at = ?
			WHERE id = ? AND revoked_at IS NULL
			"#,
		)
		.bind(at.to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		let revoked = result.rows_affected() > 0;
		if revoked {
			tracing::info!(token_id = %id, "provisioning token revoked");
		}
		Ok(revoked)
	}

	#[tracing::instrument(skip(self), fields(token_id = %id))]
	async fn touch_last_used(&self, id: &TokenId, at: DateTime<Utc>) -> Result<(), DbError> {
		sqlx::query("UPDATE provisioning_tokens SET last_used_at = ? WHERE id = ?")
			.bind(at.to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

fn parse_token_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProvisioningToken, DbError> {
	let id: String = row.get("id");
	let tenant_id: String = row.get("tenant_id");
	let scopes_json: String = row.get("scopes");
	let created_at: String = row.get("created_at");

	let scopes: Vec<ProvisioningScope> = serde_json::from_str(&scopes_json)?;

	Ok(ProvisioningToken {
		id: parse_id(&id, "token id")?,
		tenant_id: parse_id(&tenant_id, "tenant_id")?,
		name: row.get("name"),
		prefix: row.get("prefix"),
		token_hash: row.get("token_hash"),
		scopes,
		created_at: parse_timestamp(&created_at, "created_at")?,
		expires_at: parse_optional_timestamp(row.get("expires_at"), "expires_at")?,
		last_used_at: parse_optional_timestamp(row.get("last_used_at"), "last_used_at")?,
		revoked_at: parse_optional_timestamp(row.get("revoked_at"), "revoked_at")?,
		rotated_at: parse_optional_timestamp(row.get("rotated_at"), "rotated_at")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	fn token(tenant_id: TenantId, prefix: &str) -> ProvisioningToken {
		ProvisioningToken {
			id: TokenId::generate(),
			tenant_id,
			name: "okta".to_string(),
			prefix: prefix.to_string(),
			token_hash: "$argon2id$fake".to_string(),
			scopes: vec![ProvisioningScope::UsersRead, ProvisioningScope::Bulk],
			created_at: Utc::now(),
			expires_at: None,
			last_used_at: None,
			revoked_at: None,
			rotated_at: None,
		}
	}

	async fn make_repo() -> TokenRepository {
		TokenRepository::new(create_test_pool().await)
	}

	#[tokio::test]
	async fn insert_then_get_round_trips_scopes() {
		let repo = make_repo().await;
		let t = token(TenantId::generate(), "abcd1234");
		repo.insert_token(&t).await.unwrap();

		let fetched = repo.get_token(&t.id).await.unwrap().unwrap();
		assert_eq!(fetched.scopes, t.scopes);
		assert_eq!(fetched.prefix, "abcd1234");
		assert_eq!(fetched.token_hash, t.token_hash);
	}

	#[tokio::test]
	async fn prefix_lookup_returns_all_collisions() {
		let repo = make_repo().await;
		let tenant = TenantId::generate();
		repo.insert_token(&token(tenant, "samepfx1")).await.unwrap();
		repo.insert_token(&token(tenant, "samepfx1")).await.unwrap();
		repo.insert_token(&token(tenant, "otherpfx")).await.unwrap();

		assert_eq!(repo.find_tokens_by_prefix("samepfx1").await.unwrap().len(), 2);
		assert!(repo.find_tokens_by_prefix("missing0").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn duplicate_id_is_a_conflict() {
		let repo = make_repo().await;
		let t = token(TenantId::generate(), "abcd1234");
		repo.insert_token(&t).await.unwrap();
		let err = repo.insert_token(&t).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn list_is_scoped_to_tenant() {
		let repo = make_repo().await;
		let a = TenantId::generate();
		let b = TenantId::generate();
		repo.insert_token(&token(a, "aaaaaaaa")).await.unwrap();
		repo.insert_token(&token(b, "bbbbbbbb")).await.unwrap();

		let listed = repo.list_tokens(&a).await.unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].tenant_id, a);
	}

	#[tokio::test]
	async fn revoke_is_once_only_and_blocks_rotation() {
		let repo = make_repo().await;
		let t = token(TenantId::generate(), "abcd1234");
		repo.insert_token(&t).await.unwrap();

		assert!(repo.revoke_token(&t.id, Utc::now()).await.unwrap());
		assert!(!repo.revoke_token(&t.id, Utc::now()).await.unwrap());
		assert!(!repo
			.replace_secret(&t.id, "newpfx00", "hash", Utc::now())
			.await
			.unwrap());

		let fetched = repo.get_token(&t.id).await.unwrap().unwrap();
		assert!(fetched.revoked_at.is_some());
		assert_eq!(fetched.prefix, "abcd1234");
	}

	#[tokio::test]
	async fn replace_secret_updates_prefix_and_hash() {
		let repo = make_repo().await;
		let t = token(TenantId::generate(), "abcd1234");
		repo.insert_token(&t).await.unwrap();

		assert!(repo
			.replace_secret(&t.id, "newpfx00", "$argon2id$new", Utc::now())
			.await
			.unwrap());
		let fetched = repo.get_token(&t.id).await.unwrap().unwrap();
		assert_eq!(fetched.prefix, "newpfx00");
		assert_eq!(fetched.token_hash, "$argon2id$new");
		assert!(fetched.rotated_at.is_some());
	}

	#[tokio::test]
	async fn touch_last_used_sets_timestamp() {
		let repo = make_repo().await;
		let t = token(TenantId::generate(), "abcd1234");
		repo.insert_token(&t).await.unwrap();
		repo.touch_last_used(&t.id, Utc::now()).await.unwrap();
		assert!(repo.get_token(&t.id).await.unwrap().unwrap().last_used_at.is_some());
	}
}
