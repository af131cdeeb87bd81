// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Table bootstrap. Statements are idempotent.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS provisioning_tokens (
		id TEXT PRIMARY KEY,
		tenant_id TEXT NOT NULL,
		name TEXT NOT NULL,
		prefix TEXT NOT NULL,
		token_hash TEXT NOT NULL,
		scopes TEXT NOT NULL,
		created_at TEXT NOT NULL,
		expires_at TEXT,
		last_used_at TEXT,
		revoked_at TEXT,
		rotated_at TEXT
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_provisioning_tokens_prefix ON provisioning_tokens (prefix)",
	"CREATE INDEX IF NOT EXISTS idx_provisioning_tokens_tenant ON provisioning_tokens (tenant_id)",
	r#"
	CREATE TABLE IF NOT EXISTS scim_group_mappings (
		tenant_id TEXT NOT NULL,
		scim_id TEXT NOT NULL,
		external_id TEXT,
		team_ref TEXT NOT NULL,
		display_name TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (tenant_id, scim_id),
		UNIQUE (tenant_id, external_id),
		UNIQUE (tenant_id, team_ref)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS scim_user_mappings (
		tenant_id TEXT NOT NULL,
		account_id TEXT NOT NULL,
		external_id TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (tenant_id, account_id),
		UNIQUE (tenant_id, external_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS scim_attribute_mappings (
		tenant_id TEXT NOT NULL,
		scim_path TEXT NOT NULL,
		target_field TEXT NOT NULL,
		PRIMARY KEY (tenant_id, scim_path)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS scim_tenant_settings (
		tenant_id TEXT PRIMARY KEY,
		prevent_duplicates INTEGER NOT NULL,
		auto_activate INTEGER NOT NULL,
		delete_mode TEXT NOT NULL,
		sync_groups INTEGER NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS provisioning_logs (
		id TEXT PRIMARY KEY,
		tenant_id TEXT NOT NULL,
		event_type TEXT NOT NULL,
		resource_type TEXT,
		resource_id TEXT,
		outcome TEXT NOT NULL,
		details TEXT NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_provisioning_logs_tenant ON provisioning_logs (tenant_id, created_at)",
];

#[tracing::instrument(skip(pool))]
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), DbError> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = STATEMENTS.len(), "schema applied");
	Ok(())
}
