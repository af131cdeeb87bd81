// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use tessera_server_auth::TenantId;

use crate::error::DbError;
use crate::types::{DeleteMode, TenantSettings};

#[async_trait]
pub trait TenantSettingsStore: Send + Sync {
	/// `None` when the tenant never stored settings; callers apply defaults.
	async fn get_tenant_settings(&self, tenant_id: &TenantId)
		-> Result<Option<TenantSettings>, DbError>;
	async fn put_tenant_settings(
		&self,
		tenant_id: &TenantId,
		settings: &TenantSettings,
	) -> Result<(), DbError>;
}

#[derive(Clone)]
pub struct TenantSettingsRepository {
	pool: SqlitePool,
}

impl TenantSettingsRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl TenantSettingsStore for TenantSettingsRepository {
	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_tenant_settings(
		&self,
		tenant_id: &TenantId,
	) -> Result<Option<TenantSettings>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT prevent_duplicates, auto_activate, delete_mode, sync_groups
			FROM scim_tenant_settings
			WHERE tenant_id = ?
			"#,
		)
		.bind(tenant_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};

		let delete_mode: String = row.get("delete_mode");
		Ok(Some(TenantSettings {
			prevent_duplicates: row.get::<i64, _>("prevent_duplicates") != 0,
			auto_activate: row.get::<i64, _>("auto_activate") != 0,
			delete_mode: delete_mode.parse::<DeleteMode>().map_err(DbError::Internal)?,
			sync_groups: row.get::<i64, _>("sync_groups") != 0,
		}))
	}

	#[tracing::instrument(skip(self, settings), fields(tenant_id = %tenant_id))]
	async fn put_tenant_settings(
		&self,
		tenant_id: &TenantId,
		settings: &TenantSettings,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO scim_tenant_settings (
				tenant_id, prevent_duplicates, auto_activate, delete_mode, sync_groups, updated_at
			) VALUES (?, ?, ?, ?, ?, ?)
			ON CONFLICT (tenant_id) DO UPDATE SET
				prevent_duplicates = excluded.prevent_duplicates,
				auto_activate = excluded.auto_activate,
				delete_mode = excluded.delete_mode,
				sync_groups = excluded.sync_groups,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(tenant_id.to_string())
		.bind(settings.prevent_duplicates as i64)
		.bind(settings.auto_activate as i64)
		.bind(settings.delete_mode.as_str())
		.bind(settings.sync_groups as i64)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;

		tracing::info!(delete_mode = %settings.delete_mode, "tenant settings stored");
		Ok(())
	}
}
