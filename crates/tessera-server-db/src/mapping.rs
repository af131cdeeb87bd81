// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Group, user and attribute mappings, all scoped by tenant.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use tessera_server_auth::TenantId;

use crate::error::DbError;
use crate::row::{parse_id, parse_timestamp};
use crate::types::{AttributeMapping, GroupMapping, UserMapping};

#[async_trait]
pub trait GroupMappingStore: Send + Sync {
	async fn insert_group_mapping(&self, mapping: &GroupMapping) -> Result<(), DbError>;
	async fn get_group_mapping(
		&self,
		tenant_id: &TenantId,
		scim_id: &str,
	) -> Result<Option<GroupMapping>, DbError>;
	async fn get_group_mapping_by_external_id(
		&self,
		tenant_id: &TenantId,
		external_id: &str,
	) -> Result<Option<GroupMapping>, DbError>;
	async fn get_group_mapping_by_team(
		&self,
		tenant_id: &TenantId,
		team_ref: &str,
	) -> Result<Option<GroupMapping>, DbError>;
	async fn list_group_mappings(&self, tenant_id: &TenantId) -> Result<Vec<GroupMapping>, DbError>;
	async fn update_group_mapping(&self, mapping: &GroupMapping) -> Result<bool, DbError>;
	async fn delete_group_mapping(&self, tenant_id: &TenantId, scim_id: &str)
		-> Result<bool, DbError>;
}

#[async_trait]
pub trait UserMappingStore: Send + Sync {
	/// Insert or replace the external id recorded for an account.
	async fn upsert_user_mapping(&self, mapping: &UserMapping) -> Result<(), DbError>;
	async fn get_user_mapping(
		&self,
		tenant_id: &TenantId,
		account_id: &str,
	) -> Result<Option<UserMapping>, DbError>;
	async fn get_user_mapping_by_external_id(
		&self,
		tenant_id: &TenantId,
		external_id: &str,
	) -> Result<Option<UserMapping>, DbError>;
	async fn delete_user_mapping(&self, tenant_id: &TenantId, account_id: &str)
		-> Result<bool, DbError>;
}

#[async_trait]
pub trait AttributeMappingStore: Send + Sync {
	async fn get_attribute_mappings(
		&self,
		tenant_id: &TenantId,
	) -> Result<Vec<AttributeMapping>, DbError>;
	/// Replace the whole table for a tenant atomically.
	async fn replace_attribute_mappings(
		&self,
		tenant_id: &TenantId,
		mappings: &[AttributeMapping],
	) -> Result<(), DbError>;
}

#[derive(Clone)]
pub struct MappingRepository {
	pool: SqlitePool,
}

impl MappingRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	async fn fetch_group_mapping(
		&self,
		tenant_id: &TenantId,
		column: &str,
		value: &str,
	) -> Result<Option<GroupMapping>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {GROUP_COLUMNS} FROM scim_group_mappings WHERE tenant_id = ? AND {column} = ?"
		))
		.bind(tenant_id.to_string())
		.bind(value)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_group_mapping_row).transpose()
	}
}

const GROUP_COLUMNS: &str =
	"tenant_id, scim_id, external_id, team_ref, display_name, created_at, updated_at";

#[async_trait]
impl GroupMappingStore for MappingRepository {
	#[tracing::instrument(skip(self, mapping), fields(tenant_id = %mapping.tenant_id, scim_id = %mapping.scim_id))]
	async fn insert_group_mapping(&self, mapping: &GroupMapping) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO scim_group_mappings (
				tenant_id, scim_id, external_id, team_ref, display_name, created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(mapping.tenant_id.to_string())
		.bind(&mapping.scim_id)
		.bind(&mapping.external_id)
		.bind(&mapping.team_ref)
		.bind(&mapping.display_name)
		.bind(mapping.created_at.to_rfc3339())
		.bind(mapping.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, "group mapping"))?;

		tracing::debug!(team_ref = %mapping.team_ref, "group mapping created");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_group_mapping(
		&self,
		tenant_id: &TenantId,
		scim_id: &str,
	) -> Result<Option<GroupMapping>, DbError> {
		self.fetch_group_mapping(tenant_id, "scim_id", scim_id).await
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_group_mapping_by_external_id(
		&self,
		tenant_id: &TenantId,
		external_id: &str,
	) -> Result<Option<GroupMapping>, DbError> {
		self
			.fetch_group_mapping(tenant_id, "external_id", external_id)
			.await
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_group_mapping_by_team(
		&self,
		tenant_id: &TenantId,
		team_ref: &str,
	) -> Result<Option<GroupMapping>, DbError> {
		self.fetch_group_mapping(tenant_id, "team_ref", team_ref).await
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn list_group_mappings(&self, tenant_id: &TenantId) -> Result<Vec<GroupMapping>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {GROUP_COLUMNS} FROM scim_group_mappings WHERE tenant_id = ? \
			 ORDER BY created_at, scim_id"
		))
		.bind(tenant_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_group_mapping_row).collect()
	}

	#[tracing::instrument(skip(self, mapping), fields(tenant_id = %mapping.tenant_id, scim_id = %mapping.scim_id))]
	async fn update_group_mapping(&self, mapping: &GroupMapping) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE scim_group_mappings
			SET external_id = ?, display_name = ?, updated_at = ?
			WHERE tenant_id = ? AND scim_id = ?
			"#,
		)
		.bind(&mapping.external_id)
		.bind(&mapping.display_name)
		.bind(Utc::now().to_rfc3339())
		.bind(mapping.tenant_id.to_string())
		.bind(&mapping.scim_id)
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, "group external id"))?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn delete_group_mapping(
		&self,
		tenant_id: &TenantId,
		scim_id: &str,
	) -> Result<bool, DbError> {
		let result =
			sqlx::query("DELETE FROM scim_group_mappings WHERE tenant_id = ? AND scim_id = ?")
				.bind(tenant_id.to_string())
				.bind(scim_id)
				.execute(&self.pool)
				.await?;
		Ok(result.rows_affected() > 0)
	}
}

#[async_trait]
impl UserMappingStore for MappingRepository {
	#[tracing::instrument(skip(self, mapping), fields(tenant_id = %mapping.tenant_id, account_id = %mapping.account_id))]
	async fn upsert_user_mapping(&self, mapping: &UserMapping) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO scim_user_mappings (tenant_id, account_id, external_id, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT (tenant_id, account_id)
			DO UPDATE SET external_id = excluded.external_id, updated_at = excluded.updated_at
			"#,
		)
		.bind(mapping.tenant_id.to_string())
		.bind(&mapping.account_id)
		.bind(&mapping.external_id)
		.bind(mapping.created_at.to_rfc3339())
		.bind(mapping.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, "user external id"))?;
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_user_mapping(
		&self,
		tenant_id: &TenantId,
		account_id: &str,
	) -> Result<Option<UserMapping>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT tenant_id, account_id, external_id, created_at, updated_at
			FROM scim_user_mappings
			WHERE tenant_id = ? AND account_id = ?
			"#,
		)
		.bind(tenant_id.to_string())
		.bind(account_id)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_user_mapping_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_user_mapping_by_external_id(
		&self,
		tenant_id: &TenantId,
		external_id: &str,
	) -> Result<Option<UserMapping>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT tenant_id, account_id, external_id, created_at, updated_at
			FROM scim_user_mappings
			WHERE tenant_id = ? AND external_id = ?
			"#,
		)
		.bind(tenant_id.to_string())
		.bind(external_id)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_user_mapping_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn delete_user_mapping(
		&self,
		tenant_id: &TenantId,
		account_id: &str,
	) -> Result<bool, DbError> {
		let result =
			sqlx::query("DELETE FROM scim_user_mappings WHERE tenant_id = ? AND account_id = ?")
				.bind(tenant_id.to_string())
				.bind(account_id)
				.execute(&self.pool)
				.await?;
		Ok(result.rows_affected() > 0)
	}
}

#[async_trait]
impl AttributeMappingStore for MappingRepository {
	#[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
	async fn get_attribute_mappings(
		&self,
		tenant_id: &TenantId,
	) -> Result<Vec<AttributeMapping>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT scim_path, target_field
			FROM scim_attribute_mappings
			WHERE tenant_id = ?
			ORDER BY scim_path
			"#,
		)
		.bind(tenant_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows
			.iter()
			.map(|row| AttributeMapping {
				scim_path: row.get("scim_path"),
				target_field: row.get("target_field"),
			})
			.collect())
	}

	#[tracing::instrument(skip(self, mappings), fields(tenant_id = %tenant_id, count = mappings.len()))]
	async fn replace_attribute_mappings(
		&self,
		tenant_id: &TenantId,
		mappings: &[AttributeMapping],
	) -> Result<(), DbError> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM scim_attribute_mappings WHERE tenant_id = ?")
			.bind(tenant_id.to_string())
			.execute(&mut *tx)
			.await?;

		for mapping in mappings {
			sqlx::query(
				"INSERT INTO scim_attribute_mappings (tenant_id, scim_path, target_field) VALUES (?, ?, ?)",
			)
			.bind(tenant_id.to_string())
			.bind(&mapping.scim_path)
			.bind(&mapping.target_field)
			.execute(&mut *tx)
			.await
			.map_err(|e| DbError::from_insert(e, "attribute mapping"))?;
		}

		tx.commit().await?;
		tracing::info!("attribute mappings replaced");
		Ok(())
	}
}

fn parse_group_mapping_row(row: &sqlx::sqlite::SqliteRow) -> Result<GroupMapping, DbError> {
	let tenant_id: String = row.get("tenant_id");
	let created_at: String = row.get("created_at");
	let updated_at: String = row.get("updated_at");

	Ok(GroupMapping {
		tenant_id: parse_id(&tenant_id, "tenant_id")?,
		scim_id: row.get("scim_id"),
		external_id: row.get("external_id"),
		team_ref: row.get("team_ref"),
		display_name: row.get("display_name"),
		created_at: parse_timestamp(&created_at, "created_at")?,
		updated_at: parse_timestamp(&updated_at, "updated_at")?,
	})
}

fn parse_user_mapping_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserMapping, DbError> {
	let tenant_id: String = row.get("tenant_id");
	let created_at: String = row.get("created_at");
	let updated_at: String = row.get("updated_at");

	Ok(UserMapping {
		tenant_id: parse_id(&tenant_id, "tenant_id")?,
		account_id: row.get("account_id"),
		external_id: row.get("external_id"),
		created_at: parse_timestamp(&created_at, "created_at")?,
		updated_at: parse_timestamp(&updated_at, "updated_at")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	fn group_mapping(tenant_id: TenantId, scim_id: &str, external_id: Option<&str>) -> GroupMapping {
		let now = Utc::now();
		GroupMapping {
			tenant_id,
			scim_id: scim_id.to_string(),
			external_id: external_id.map(str::to_string),
			team_ref: format!("team-{scim_id}"),
			display_name: "Engineering".to_string(),
			created_at: now,
			updated_at: now,
		}
	}

	async fn make_repo() -> MappingRepository {
		MappingRepository::new(create_test_pool().await)
	}

	mod groups {
		use super::*;

		#[tokio::test]
		async fn lookup_by_every_key() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			let m = group_mapping(tenant, "g1", Some("okta-g1"));
			repo.insert_group_mapping(&m).await.unwrap();

			assert_eq!(repo.get_group_mapping(&tenant, "g1").await.unwrap(), Some(m.clone()));
			assert_eq!(
				repo
					.get_group_mapping_by_external_id(&tenant, "okta-g1")
					.await
					.unwrap()
					.map(|g| g.scim_id),
				Some("g1".to_string())
			);
			assert!(repo
				.get_group_mapping_by_team(&tenant, "team-g1")
				.await
				.unwrap()
				.is_some());
		}

		#[tokio::test]
		async fn external_id_unique_per_tenant() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			repo
				.insert_group_mapping(&group_mapping(tenant, "g1", Some("dup")))
				.await
				.unwrap();
			let err = repo
				.insert_group_mapping(&group_mapping(tenant, "g2", Some("dup")))
				.await
				.unwrap_err();
			assert!(matches!(err, DbError::Conflict(_)));

			let other = TenantId::generate();
			repo
				.insert_group_mapping(&group_mapping(other, "g1", Some("dup")))
				.await
				.unwrap();
		}

		#[tokio::test]
		async fn missing_external_ids_do_not_collide() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			repo
				.insert_group_mapping(&group_mapping(tenant, "g1", None))
				.await
				.unwrap();
			repo
				.insert_group_mapping(&group_mapping(tenant, "g2", None))
				.await
				.unwrap();
			assert_eq!(repo.list_group_mappings(&tenant).await.unwrap().len(), 2);
		}

		#[tokio::test]
		async fn tenant_isolation_on_read() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			repo
				.insert_group_mapping(&group_mapping(tenant, "g1", None))
				.await
				.unwrap();
			assert!(repo
				.get_group_mapping(&TenantId::generate(), "g1")
				.await
				.unwrap()
				.is_none());
		}

		#[tokio::test]
		async fn update_and_delete() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			let mut m = group_mapping(tenant, "g1", None);
			repo.insert_group_mapping(&m).await.unwrap();

			m.display_name = "Platform".to_string();
			m.external_id = Some("ext".to_string());
			assert!(repo.update_group_mapping(&m).await.unwrap());
			let fetched = repo.get_group_mapping(&tenant, "g1").await.unwrap().unwrap();
			assert_eq!(fetched.display_name, "Platform");
			assert_eq!(fetched.external_id.as_deref(), Some("ext"));

			assert!(repo.delete_group_mapping(&tenant, "g1").await.unwrap());
			assert!(!repo.delete_group_mapping(&tenant, "g1").await.unwrap());
		}
	}

	mod users {
		use super::*;

		fn user_mapping(tenant_id: TenantId, account_id: &str, external_id: &str) -> UserMapping {
			let now = Utc::now();
			UserMapping {
				tenant_id,
				account_id: account_id.to_string(),
				external_id: Some(external_id.to_string()),
				created_at: now,
				updated_at: now,
			}
		}

		#[tokio::test]
		async fn upsert_replaces_external_id() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			repo
				.upsert_user_mapping(&user_mapping(tenant, "acct-1", "ext-1"))
				.await
				.unwrap();
			repo
				.upsert_user_mapping(&user_mapping(tenant, "acct-1", "ext-2"))
				.await
				.unwrap();

			let by_account = repo.get_user_mapping(&tenant, "acct-1").await.unwrap().unwrap();
			assert_eq!(by_account.external_id.as_deref(), Some("ext-2"));
			assert!(repo
				.get_user_mapping_by_external_id(&tenant, "ext-1")
				.await
				.unwrap()
				.is_none());
			assert_eq!(
				repo
					.get_user_mapping_by_external_id(&tenant, "ext-2")
					.await
					.unwrap()
					.unwrap()
					.account_id,
				"acct-1"
			);
		}

		#[tokio::test]
		async fn external_id_conflict_across_accounts() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			repo
				.upsert_user_mapping(&user_mapping(tenant, "acct-1", "ext"))
				.await
				.unwrap();
			let err = repo
				.upsert_user_mapping(&user_mapping(tenant, "acct-2", "ext"))
				.await
				.unwrap_err();
			assert!(matches!(err, DbError::Conflict(_)));
		}

		#[tokio::test]
		async fn delete_removes_mapping() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			repo
				.upsert_user_mapping(&user_mapping(tenant, "acct-1", "ext"))
				.await
				.unwrap();
			assert!(repo.delete_user_mapping(&tenant, "acct-1").await.unwrap());
			assert!(repo.get_user_mapping(&tenant, "acct-1").await.unwrap().is_none());
		}
	}

	mod attributes {
		use super::*;

		#[tokio::test]
		async fn replace_is_total() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			let first = vec![
				AttributeMapping {
					scim_path: "title".to_string(),
					target_field: "display_name".to_string(),
				},
				AttributeMapping {
					scim_path: "nickname".to_string(),
					target_field: "display_name".to_string(),
				},
			];
			repo.replace_attribute_mappings(&tenant, &first).await.unwrap();
			assert_eq!(repo.get_attribute_mappings(&tenant).await.unwrap().len(), 2);

			let second = vec![AttributeMapping {
				scim_path: "title".to_string(),
				target_field: "family_name".to_string(),
			}];
			repo.replace_attribute_mappings(&tenant, &second).await.unwrap();
			assert_eq!(repo.get_attribute_mappings(&tenant).await.unwrap(), second);
		}

		#[tokio::test]
		async fn duplicate_path_rolls_back() {
			let repo = make_repo().await;
			let tenant = TenantId::generate();
			let original = vec![AttributeMapping {
				scim_path: "title".to_string(),
				target_field: "display_name".to_string(),
			}];
			repo.replace_attribute_mappings(&tenant, &original).await.unwrap();

			let dup = vec![original[0].clone(), original[0].clone()];
			assert!(repo.replace_attribute_mappings(&tenant, &dup).await.is_err());
			assert_eq!(repo.get_attribute_mappings(&tenant).await.unwrap(), original);
		}
	}
}
