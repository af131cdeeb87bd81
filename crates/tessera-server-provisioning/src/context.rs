// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request context: tenant binding, scopes and cancellation.

use std::future::Future;
use std::time::Duration;

use tessera_server_auth::{ProvisioningScope, ProvisioningToken, TenantId, TokenId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProvisioningError;

/// Everything a provisioning operation needs to know about its caller.
///
/// Every backend call made on behalf of a request goes through [`run`], which
/// races it against the request's cancellation token and deadline.
///
/// [`run`]: RequestContext::run
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub tenant_id: TenantId,
	pub token_id: Option<TokenId>,
	pub scopes: Vec<ProvisioningScope>,
	pub request_id: String,
	cancel: CancellationToken,
	deadline: Option<Instant>,
}

impl RequestContext {
	/// A context holding every scope, for internal callers.
	pub fn system(tenant_id: TenantId) -> Self {
		Self {
			tenant_id,
			token_id: None,
			scopes: vec![ProvisioningScope::Admin],
			request_id: Uuid::new_v4().to_string(),
			cancel: CancellationToken::new(),
			deadline: None,
		}
	}

	pub fn for_token(token: &ProvisioningToken) -> Self {
		Self {
			tenant_id: token.tenant_id,
			token_id: Some(token.id),
			scopes: token.scopes.clone(),
			request_id: Uuid::new_v4().to_string(),
			cancel: CancellationToken::new(),
			deadline: None,
		}
	}

	pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = request_id.into();
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.deadline = Some(Instant::now() + timeout);
		self
	}

	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
	}

	/// Fails with `Cancelled` once the request was cancelled or its deadline passed.
	pub fn check(&self) -> Result<(), ProvisioningError> {
		if self.is_cancelled() {
			return Err(ProvisioningError::Cancelled);
		}
		Ok(())
	}

	pub fn require(&self, scope: ProvisioningScope) -> Result<(), ProvisioningError> {
		if ProvisioningScope::is_granted(&self.scopes, scope) {
			Ok(())
		} else {
			Err(ProvisioningError::Authorization(format!(
				"token lacks the '{scope}' scope"
			)))
		}
	}

	/// Run a backend call, aborting it if the request is cancelled first.
	pub async fn run<F, T, E>(&self, fut: F) -> Result<T, ProvisioningError>
	where
		F: Future<Output = Result<T, E>>,
		E: Into<ProvisioningError>,
	{
		let deadline = async {
			match self.deadline {
				Some(deadline) => tokio::time::sleep_until(deadline).await,
				None => std::future::pending().await,
			}
		};

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(ProvisioningError::Cancelled),
			_ = deadline => Err(ProvisioningError::Cancelled),
			result = fut => result.map_err(Into::into),
		}
	}
}
