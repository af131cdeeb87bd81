// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::Response,
	Extension,
};
use tessera_scim::{ListResponse, PatchRequest, ScimUser, SearchRequest};
use tessera_server_provisioning::{ListQuery, RequestContext};

use crate::error::ApiError;
use crate::extract::ScimJson;
use crate::handlers::created;
use crate::state::ScimState;

pub async fn list_users(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<ListQuery>,
) -> Result<ScimJson<ListResponse<ScimUser>>, ApiError> {
	Ok(ScimJson(state.service.list_users(&ctx, query).await?))
}

pub async fn search_users(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(request): ScimJson<SearchRequest>,
) -> Result<ScimJson<ListResponse<ScimUser>>, ApiError> {
	Ok(ScimJson(state.service.search_users(&ctx, request).await?))
}

pub async fn create_user(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(user): ScimJson<ScimUser>,
) -> Result<Response, ApiError> {
	let user = state.service.create_user(&ctx, user).await?;
	let location = user.meta.as_ref().and_then(|m| m.location.clone());
	Ok(created(location.as_deref(), user))
}

pub async fn get_user(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
) -> Result<ScimJson<ScimUser>, ApiError> {
	Ok(ScimJson(state.service.get_user(&ctx, &id).await?))
}

pub async fn replace_user(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
	ScimJson(user): ScimJson<ScimUser>,
) -> Result<ScimJson<ScimUser>, ApiError> {
	Ok(ScimJson(state.service.replace_user(&ctx, &id, user).await?))
}

pub async fn patch_user(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
	ScimJson(patch): ScimJson<PatchRequest>,
) -> Result<ScimJson<ScimUser>, ApiError> {
	Ok(ScimJson(state.service.patch_user(&ctx, &id, patch).await?))
}

pub async fn delete_user(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_user(&ctx, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}
