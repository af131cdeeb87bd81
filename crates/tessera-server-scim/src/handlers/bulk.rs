// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{body::Bytes, extract::State, Extension};
use tessera_scim::{BulkRequest, BulkResponse};
use tessera_server_auth::ProvisioningScope;
use tessera_server_provisioning::{ProvisioningError, RequestContext};
use tracing::debug;

use crate::error::ApiError;
use crate::extract::ScimJson;
use crate::state::ScimState;

/// The body is taken raw so the byte limit is checked before parsing.
pub async fn bulk_operations(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	body: Bytes,
) -> Result<ScimJson<BulkResponse>, ApiError> {
	ctx.require(ProvisioningScope::Bulk)?;
	state
		.service
		.bulk_coordinator()
		.check_payload_size(body.len())?;

	let request: BulkRequest = serde_json::from_slice(&body)
		.map_err(|e| ProvisioningError::invalid_syntax(format!("invalid bulk request: {e}")))?;
	debug!(operations = request.operations.len(), bytes = body.len(), "bulk request received");

	Ok(ScimJson(state.service.bulk(&ctx, request, body.len()).await?))
}
