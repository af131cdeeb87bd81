// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Append-only per-tenant log of provisioning activity.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use tessera_server_auth::TenantId;

use crate::error::DbError;
use crate::row::{parse_id, parse_timestamp};
use crate::types::ProvisioningLogEntry;

#[async_trait]
pub trait ProvisioningLogStore: Send + Sync {
	async fn append_log(&self, entry: &ProvisioningLogEntry) -> Result<(), DbError>;
	/// Most recent first.
	async fn list_logs(
		&self,
		tenant_id: &TenantId,
		limit: u32,
	) -> Result<Vec<ProvisioningLogEntry>, DbError>;
}

#[derive(Clone)]
pub struct ProvisioningLogRepository {
	pool: SqlitePool,
}

impl ProvisioningLogRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl ProvisioningLogStore for ProvisioningLogRepository {
	#[tracing::instrument(skip(self, entry), fields(tenant_id = %entry.tenant_id, event_type = %entry.event_type))]
	async fn append_log(&self, entry: &ProvisioningLogEntry) -> Result<(), DbError> {
		let details = serde_json::to_string(&entry.details)?;
		sqlx::query(
			r#"
			INSERT INTO provisioning_logs (
				id, tenant_id, event_type, resource_type, resource_id, outcome, details, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&entry.id)
		.bind(entry.tenant_id.to_string())
		.bind(&entry.event_type)
		.bind(&entry.resource_type)
		.bind(&entry.resource_id)
		.bind(&entry.outcome)
		.bind(details)
		.bind(entry.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn list_logs(
		&self,
		tenant_id: &TenantId,
		limit: u32,
	) -> Result<Vec<ProvisioningLogEntry>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, tenant_id, event_type, resource_type, resource_id, outcome, details, created_at
			FROM provisioning_logs
			WHERE tenant_id = ?
			ORDER BY created_at DESC, rowid DESC
			LIMIT ?
			"#,
		)
		.bind(tenant_id.to_string())
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_log_row).collect()
	}
}

fn parse_log_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProvisioningLogEntry, DbError> {
	let tenant_id: String = row.get("tenant_id");
	let details: String = row.get("details");
	let created_at: String = row.get("created_at");

	Ok(ProvisioningLogEntry {
		id: row.get("id"),
		tenant_id: parse_id(&tenant_id, "tenant_id")?,
		event_type: row.get("event_type"),
		resource_type: row.get("resource_type"),
		resource_id: row.get("resource_id"),
		outcome: row.get("outcome"),
		details: serde_json::from_str(&details)?,
		created_at: parse_timestamp(&created_at, "created_at")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use chrono::{Duration, Utc};

	fn entry(tenant_id: TenantId, event_type: &str, offset_secs: i64) -> ProvisioningLogEntry {
		ProvisioningLogEntry {
			id: uuid::Uuid::new_v4().to_string(),
			tenant_id,
			event_type: event_type.to_string(),
			resource_type: Some("user".to_string()),
			resource_id: Some("u-1".to_string()),
			outcome: "success".to_string(),
			details: serde_json::json!({"user_name": "alice"}),
			created_at: Utc::now() + Duration::seconds(offset_secs),
		}
	}

	#[tokio::test]
	async fn lists_most_recent_first_with_limit() {
		let repo = ProvisioningLogRepository::new(create_test_pool().await);
		let tenant = TenantId::generate();
		repo.append_log(&entry(tenant, "user_created", 0)).await.unwrap();
		repo.append_log(&entry(tenant, "user_updated", 1)).await.unwrap();
		repo.append_log(&entry(tenant, "user_deleted", 2)).await.unwrap();
		repo
			.append_log(&entry(TenantId::generate(), "user_created", 3))
			.await
			.unwrap();

		let logs = repo.list_logs(&tenant, 2).await.unwrap();
		assert_eq!(logs.len(), 2);
		assert_eq!(logs[0].event_type, "user_deleted");
		assert_eq!(logs[1].event_type, "user_updated");
		assert_eq!(logs[0].details["user_name"], "alice");
	}
}
