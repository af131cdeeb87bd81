// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant administration over plain JSON. Every handler needs the `admin`
//! scope, enforced by the provisioning layer.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_server_auth::{ProvisioningScope, ProvisioningToken, TokenId};
use tessera_server_db::{AttributeMapping, ProvisioningLogEntry, TenantSettings};
use tessera_server_provisioning::{EndpointStats, IssuedToken, ProvisioningError, RequestContext};

use crate::error::ApiError;
use crate::extract::ScimJson;
use crate::state::ScimState;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
	pub name: String,
	/// Defaults to every protocol scope.
	#[serde(default)]
	pub scopes: Vec<ProvisioningScope>,
	#[serde(default)]
	pub expires_at: Option<DateTime<Utc>>,
}

/// The only response that ever carries a token's plaintext.
#[derive(Debug, Serialize)]
pub struct IssuedTokenResponse {
	pub token: ProvisioningToken,
	pub secret: String,
}

impl From<IssuedToken> for IssuedTokenResponse {
	fn from(issued: IssuedToken) -> Self {
		Self {
			secret: issued.secret.expose().clone(),
			token: issued.token,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
	pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
	pub backend: &'static str,
	pub endpoints: Vec<EndpointStats>,
}

fn parse_token_id(id: &str) -> Result<TokenId, ApiError> {
	id.parse()
		.map_err(|_| ProvisioningError::NotFound(format!("token {id}")).into())
}

pub async fn create_token(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(request): ScimJson<CreateTokenRequest>,
) -> Result<(StatusCode, Json<IssuedTokenResponse>), ApiError> {
	let issued = state
		.tokens
		.issue(&ctx, &request.name, request.scopes, request.expires_at)
		.await?;
	Ok((StatusCode::CREATED, Json(issued.into())))
}

pub async fn list_tokens(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<ProvisioningToken>>, ApiError> {
	Ok(Json(state.tokens.list(&ctx).await?))
}

pub async fn revoke_token(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	let id = parse_token_id(&id)?;
	state.tokens.revoke(&ctx, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}

pub async fn rotate_token(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
) -> Result<Json<IssuedTokenResponse>, ApiError> {
	let id = parse_token_id(&id)?;
	Ok(Json(state.tokens.rotate(&ctx, &id).await?.into()))
}

pub async fn get_mappings(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<AttributeMapping>>, ApiError> {
	Ok(Json(state.service.attribute_mappings(&ctx).await?))
}

pub async fn put_mappings(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(mappings): ScimJson<Vec<AttributeMapping>>,
) -> Result<Json<Vec<AttributeMapping>>, ApiError> {
	Ok(Json(
		state.service.replace_attribute_mappings(&ctx, mappings).await?,
	))
}

pub async fn get_settings(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
) -> Result<Json<TenantSettings>, ApiError> {
	Ok(Json(state.service.settings(&ctx).await?))
}

pub async fn put_settings(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(settings): ScimJson<TenantSettings>,
) -> Result<Json<TenantSettings>, ApiError> {
	Ok(Json(state.service.update_settings(&ctx, settings).await?))
}

pub async fn get_logs(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ProvisioningLogEntry>>, ApiError> {
	Ok(Json(state.service.provisioning_logs(&ctx, query.limit).await?))
}

pub async fn get_stats(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
) -> Result<Json<StatsResponse>, ApiError> {
	ctx.require(ProvisioningScope::Admin)?;
	Ok(Json(StatsResponse {
		backend: state.service.backend_name(),
		endpoints: state.metrics.endpoint_stats(),
	}))
}
