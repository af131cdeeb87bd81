// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use tessera_server_provisioning::{
	ProvisioningMetrics, ProvisioningService, TenantRateLimiter, TokenAuthority,
};

#[derive(Clone)]
pub struct ScimState {
	pub service: Arc<ProvisioningService>,
	pub tokens: Arc<TokenAuthority>,
	pub rate_limiter: Arc<TenantRateLimiter>,
	pub metrics: Arc<ProvisioningMetrics>,
	/// Deadline applied to every authenticated request.
	pub request_timeout: Option<Duration>,
}
