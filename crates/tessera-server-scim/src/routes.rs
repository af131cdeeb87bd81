// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	extract::DefaultBodyLimit,
	middleware,
	routing::{delete, get, post},
	Router,
};

use crate::auth::{scim_auth_middleware, track_requests};
use crate::handlers::{admin, bulk, discovery, groups, users};
use crate::state::ScimState;

/// Builds the SCIM router. Mount it under the configured base path.
pub fn scim_routes(state: ScimState) -> Router {
	// Headroom so oversized bulk bodies reach the handler and get a SCIM error.
	let body_limit = state
		.service
		.bulk_coordinator()
		.max_payload_bytes()
		.saturating_mul(2);

	Router::new()
		.route(
			"/ServiceProviderConfig",
			get(discovery::get_service_provider_config),
		)
		.route("/Schemas", get(discovery::list_schemas))
		.route("/Schemas/{id}", get(discovery::get_schema))
		.route("/ResourceTypes", get(discovery::list_resource_types))
		.route("/ResourceTypes/{id}", get(discovery::get_resource_type))
		.route("/Users", get(users::list_users).post(users::create_user))
		.route("/Users/.search", post(users::search_users))
		.route(
			"/Users/{id}",
			get(users::get_user)
				.put(users::replace_user)
				.patch(users::patch_user)
				.delete(users::delete_user),
		)
		.route("/Groups", get(groups::list_groups).post(groups::create_group))
		.route("/Groups/.search", post(groups::search_groups))
		.route(
			"/Groups/{id}",
			get(groups::get_group)
				.put(groups::replace_group)
				.patch(groups::patch_group)
				.delete(groups::delete_group),
		)
		.route("/.search", post(users::search_users))
		.route(
			"/Bulk",
			post(bulk::bulk_operations).layer(DefaultBodyLimit::max(body_limit)),
		)
		.nest("/admin", admin_routes())
		.layer(middleware::from_fn_with_state(
			state.clone(),
			scim_auth_middleware,
		))
		.layer(middleware::from_fn_with_state(state.clone(), track_requests))
		.with_state(state)
}

fn admin_routes() -> Router<ScimState> {
	Router::new()
		.route("/tokens", get(admin::list_tokens).post(admin::create_token))
		.route("/tokens/{id}", delete(admin::revoke_token))
		.route("/tokens/{id}/rotate", post(admin::rotate_token))
		.route(
			"/mappings",
			get(admin::get_mappings).put(admin::put_mappings),
		)
		.route(
			"/settings",
			get(admin::get_settings).put(admin::put_settings),
		)
		.route("/logs", get(admin::get_logs))
		.route("/stats", get(admin::get_stats))
}
