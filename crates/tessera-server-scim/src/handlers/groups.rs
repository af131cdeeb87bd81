// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::Response,
	Extension,
};
use tessera_scim::{ListResponse, PatchRequest, ScimGroup, SearchRequest};
use tessera_server_provisioning::{ListQuery, RequestContext};

use crate::error::ApiError;
use crate::extract::ScimJson;
use crate::handlers::created;
use crate::state::ScimState;

pub async fn list_groups(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<ListQuery>,
) -> Result<ScimJson<ListResponse<ScimGroup>>, ApiError> {
	Ok(ScimJson(state.service.list_groups(&ctx, query).await?))
}

pub async fn search_groups(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(request): ScimJson<SearchRequest>,
) -> Result<ScimJson<ListResponse<ScimGroup>>, ApiError> {
	Ok(ScimJson(state.service.search_groups(&ctx, request).await?))
}

pub async fn create_group(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	ScimJson(group): ScimJson<ScimGroup>,
) -> Result<Response, ApiError> {
	let group = state.service.create_group(&ctx, group).await?;
	let location = group.meta.as_ref().and_then(|m| m.location.clone());
	Ok(created(location.as_deref(), group))
}

pub async fn get_group(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
) -> Result<ScimJson<ScimGroup>, ApiError> {
	Ok(ScimJson(state.service.get_group(&ctx, &id).await?))
}

pub async fn replace_group(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
	ScimJson(group): ScimJson<ScimGroup>,
) -> Result<ScimJson<ScimGroup>, ApiError> {
	Ok(ScimJson(state.service.replace_group(&ctx, &id, group).await?))
}

pub async fn patch_group(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
	ScimJson(patch): ScimJson<PatchRequest>,
) -> Result<ScimJson<ScimGroup>, ApiError> {
	Ok(ScimJson(state.service.patch_group(&ctx, &id, patch).await?))
}

pub async fn delete_group(
	State(state): State<ScimState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_group(&ctx, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}
