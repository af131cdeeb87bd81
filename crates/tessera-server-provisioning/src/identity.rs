// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The account store the engine provisions into.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tessera_server_auth::AccountId;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
	#[error("account not found: {0}")]
	NotFound(AccountId),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("identity store unavailable: {0}")]
	Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
	pub id: AccountId,
	pub email: String,
	pub user_name: String,
	pub display_name: Option<String>,
	pub given_name: Option<String>,
	pub family_name: Option<String>,
	pub active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
	pub email: String,
	pub user_name: String,
	pub display_name: Option<String>,
	pub given_name: Option<String>,
	pub family_name: Option<String>,
	pub active: bool,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
	async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError>;
	async fn get_account(&self, id: &AccountId) -> Result<Option<Account>, IdentityError>;
	/// Case-insensitive.
	async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, IdentityError>;
	/// Overwrites every mutable field. Fails with `NotFound` for unknown ids.
	async fn update_account(&self, account: &Account) -> Result<Account, IdentityError>;
	async fn delete_account(&self, id: &AccountId) -> Result<bool, IdentityError>;
}

/// Process-local account store.
#[derive(Default)]
pub struct InMemoryIdentityStore {
	accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryIdentityStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.accounts.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.accounts.read().is_empty()
	}

	fn email_taken(accounts: &HashMap<AccountId, Account>, email: &str, except: Option<&AccountId>) -> bool {
		accounts
			.values()
			.any(|a| Some(&a.id) != except && a.email.eq_ignore_ascii_case(email))
	}
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
	async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError> {
		let mut accounts = self.accounts.write();
		if Self::email_taken(&accounts, &account.email, None) {
			return Err(IdentityError::Conflict(format!(
				"an account with email {} already exists",
				account.email
			)));
		}

		let now = Utc::now();
		let created = Account {
			id: AccountId::generate(),
			email: account.email,
			user_name: account.user_name,
			display_name: account.display_name,
			given_name: account.given_name,
			family_name: account.family_name,
			active: account.active,
			created_at: now,
			updated_at: now,
		};
		accounts.insert(created.id, created.clone());
		Ok(created)
	}

	async fn get_account(&self, id: &AccountId) -> Result<Option<Account>, IdentityError> {
		Ok(self.accounts.read().get(id).cloned())
	}

	async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, IdentityError> {
		Ok(self
			.accounts
			.read()
			.values()
			.find(|a| a.email.eq_ignore_ascii_case(email))
			.cloned())
	}

	async fn update_account(&self, account: &Account) -> Result<Account, IdentityError> {
		let mut accounts = self.accounts.write();
		if !accounts.contains_key(&account.id) {
			return Err(IdentityError::NotFound(account.id));
		}
		if Self::email_taken(&accounts, &account.email, Some(&account.id)) {
			return Err(IdentityError::Conflict(format!(
				"an account with email {} already exists",
				account.email
			)));
		}

		let mut updated = account.clone();
		updated.updated_at = Utc::now();
		accounts.insert(updated.id, updated.clone());
		Ok(updated)
	}

	async fn delete_account(&self, id: &AccountId) -> Result<bool, IdentityError> {
		Ok(self.accounts.write().remove(id).is_some())
	}
}
