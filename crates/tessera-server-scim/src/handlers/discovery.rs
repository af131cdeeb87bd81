// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::extract::{Path, State};
use tessera_scim::{ListResponse, ResourceType, Schema, ServiceProviderConfig};
use tessera_server_provisioning::ProvisioningError;

use crate::error::ApiError;
use crate::extract::ScimJson;
use crate::state::ScimState;

pub async fn get_service_provider_config(State(state): State<ScimState>) -> ScimJson<ServiceProviderConfig> {
	let options = state.service.options();
	ScimJson(ServiceProviderConfig::new(
		options.max_bulk_operations,
		options.max_bulk_payload_bytes,
		options.max_results,
	))
}

pub async fn list_resource_types() -> ScimJson<ListResponse<ResourceType>> {
	ScimJson(ListResponse::complete(ResourceType::all()))
}

pub async fn get_resource_type(Path(id): Path<String>) -> Result<ScimJson<ResourceType>, ApiError> {
	ResourceType::find(&id)
		.map(ScimJson)
		.ok_or_else(|| ProvisioningError::NotFound(format!("resource type {id}")).into())
}

pub async fn list_schemas() -> ScimJson<ListResponse<Schema>> {
	ScimJson(ListResponse::complete(Schema::all()))
}

pub async fn get_schema(Path(id): Path<String>) -> Result<ScimJson<Schema>, ApiError> {
	Schema::find(&id)
		.map(ScimJson)
		.ok_or_else(|| ProvisioningError::NotFound(format!("schema {id}")).into())
}
