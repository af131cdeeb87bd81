// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # tessera-server-db
//!
//! SQLite persistence for the provisioning engine.
//!
//! Each domain has a `*Store` trait consumed by the engine and a
//! `*Repository` holding a `SqlitePool`. Lookups where absence is normal
//! return `Result<Option<T>>`; updates keyed by an id the caller expects to
//! exist return `Result<bool>`.
//!
//! Timestamps are stored as RFC 3339 text and scopes as JSON arrays.

pub mod error;
pub mod mapping;
pub mod pool;
pub mod provisioning_log;
pub mod schema;
pub mod settings;
pub mod testing;
pub mod token;
pub mod types;

mod row;

pub use error::DbError;
pub use mapping::{
	AttributeMappingStore, GroupMappingStore, MappingRepository, UserMappingStore,
};
pub use pool::create_pool;
pub use provisioning_log::{ProvisioningLogRepository, ProvisioningLogStore};
pub use schema::apply_schema;
pub use settings::{TenantSettingsRepository, TenantSettingsStore};
pub use token::{TokenRepository, TokenStore};
pub use types::{
	AttributeMapping, DeleteMode, GroupMapping, ProvisioningLogEntry, TenantSettings, UserMapping,
};
