// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use axum::{
	body::{to_bytes, Body},
	http::{header, Method, Request, StatusCode},
	response::Response,
	Router,
};
use serde_json::{json, Value};
use tessera_server_auth::{ProvisioningScope, TenantId};
use tessera_server_db::testing::create_test_pool;
use tessera_server_db::{
	MappingRepository, ProvisioningLogRepository, TenantSettingsRepository, TokenRepository,
};
use tessera_server_provisioning::{
	InMemoryIdentityStore, InMemoryOrgBackend, OrganizationOrgAdapter, ProvisioningMetrics,
	ProvisioningService, RequestContext, ServiceDeps, ServiceOptions, SideEffects,
	TenantRateLimiter, TokenAuthority,
};
use tessera_server_scim::{scim_routes, ScimState};
use tower::ServiceExt;

struct TestApp {
	router: Router,
	admin_secret: String,
}

struct AppConfig {
	options: ServiceOptions,
	rate_per_second: u32,
	rate_burst: u32,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			options: ServiceOptions::default(),
			rate_per_second: 1000,
			rate_burst: 1000,
		}
	}
}

async fn setup() -> TestApp {
	setup_with(AppConfig::default()).await
}

async fn setup_with(config: AppConfig) -> TestApp {
	let pool = create_test_pool().await;
	let metrics = Arc::new(ProvisioningMetrics::new().unwrap());
	let mappings = Arc::new(MappingRepository::new(pool.clone()));

	let service = ProvisioningService::new(
		ServiceDeps {
			identity: Arc::new(InMemoryIdentityStore::new()),
			org: Arc::new(OrganizationOrgAdapter::new(Arc::new(InMemoryOrgBackend::new()))),
			group_mappings: mappings.clone(),
			user_mappings: mappings.clone(),
			attribute_mappings: mappings,
			settings: Arc::new(TenantSettingsRepository::new(pool.clone())),
			logs: Arc::new(ProvisioningLogRepository::new(pool.clone())),
			side_effects: SideEffects::disabled(metrics.clone()),
			metrics: metrics.clone(),
		},
		config.options,
	);

	let tokens = Arc::new(TokenAuthority::new(
		Arc::new(TokenRepository::new(pool)),
		metrics.clone(),
		SideEffects::disabled(metrics.clone()),
	));
	let issued = tokens
		.issue(
			&RequestContext::system(TenantId::generate()),
			"test-admin",
			vec![ProvisioningScope::Admin],
			None,
		)
		.await
		.unwrap();

	let state = ScimState {
		service: Arc::new(service),
		tokens,
		rate_limiter: Arc::new(TenantRateLimiter::new(
			config.rate_per_second,
			config.rate_burst,
		)),
		metrics,
		request_timeout: None,
	};

	TestApp {
		router: scim_routes(state),
		admin_secret: issued.secret.expose().clone(),
	}
}

impl TestApp {
	async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
		let mut builder = Request::builder().method(method).uri(uri);
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
		}
		let body = match body {
			Some(value) => {
				builder = builder.header(header::CONTENT_TYPE, "application/scim+json");
				Body::from(serde_json::to_vec(&value).unwrap())
			}
			None => Body::empty(),
		};
		self.router
			.clone()
			.oneshot(builder.body(body).unwrap())
			.await
			.unwrap()
	}

	async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
		self.send(method, uri, Some(self.admin_secret.as_str()), body).await
	}

	async fn create_user(&self, user_name: &str) -> Value {
		let response = self
			.admin(
				Method::POST,
				"/Users",
				Some(json!({
					"schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
					"userName": user_name,
					"emails": [{"value": format!("{user_name}@example.com"), "primary": true}]
				})),
			)
			.await;
		assert_eq!(response.status(), StatusCode::CREATED);
		json_body(response).await
	}
}

async fn json_body(response: Response) -> Value {
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

fn content_type(response: &Response) -> &str {
	response
		.headers()
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default()
}

#[tokio::test]
async fn missing_authorization_is_rejected() {
	let app = setup().await;
	let response = app.send(Method::GET, "/Users", None, None).await;

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
	assert_eq!(content_type(&response), "application/scim+json");

	let body = json_body(response).await;
	assert_eq!(body["status"], "401");
}

#[tokio::test]
async fn unknown_token_is_rejected() {
	let app = setup().await;
	let response = app
		.send(Method::GET, "/Users", Some("not-a-real-token"), None)
		.await;
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_then_get_user() {
	let app = setup().await;
	let response = app
		.admin(
			Method::POST,
			"/Users",
			Some(json!({
				"userName": "alice",
				"externalId": "ext-alice",
				"name": {"givenName": "Alice", "familyName": "Liddell"},
				"emails": [{"value": "alice@example.com", "primary": true}]
			})),
		)
		.await;

	assert_eq!(response.status(), StatusCode::CREATED);
	let location = response
		.headers()
		.get(header::LOCATION)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string)
		.unwrap();
	let created = json_body(response).await;
	let id = created["id"].as_str().unwrap().to_string();
	assert!(location.ends_with(&format!("/Users/{id}")));
	assert_eq!(created["externalId"], "ext-alice");

	let response = app.admin(Method::GET, &format!("/Users/{id}"), None).await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(content_type(&response), "application/scim+json");
	let fetched = json_body(response).await;
	assert_eq!(fetched["userName"], "alice");
	assert_eq!(fetched["active"], true);
}

#[tokio::test]
async fn unknown_user_is_scim_404() {
	let app = setup().await;
	let response = app
		.admin(Method::GET, "/Users/00000000-0000-0000-0000-000000000000", None)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	let body = json_body(response).await;
	assert_eq!(body["status"], "404");
}

#[tokio::test]
async fn list_users_returns_list_envelope() {
	let app = setup().await;
	for name in ["u1", "u2", "u3"] {
		app.create_user(name).await;
	}

	let response = app
		.admin(Method::GET, "/Users?startIndex=2&count=1", None)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["totalResults"], 3);
	assert_eq!(body["startIndex"], 2);
	assert_eq!(body["itemsPerPage"], 1);
	assert_eq!(body["Resources"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn filtered_list_and_search() {
	let app = setup().await;
	app.create_user("alice").await;
	app.create_user("bob").await;

	let response = app
		.admin(Method::GET, "/Users?filter=userName%20eq%20%22bob%22", None)
		.await;
	let body = json_body(response).await;
	assert_eq!(body["totalResults"], 1);
	assert_eq!(body["Resources"][0]["userName"], "bob");

	let response = app
		.admin(
			Method::POST,
			"/Users/.search",
			Some(json!({
				"schemas": ["urn:ietf:params:scim:api:messages:2.0:SearchRequest"],
				"filter": "userName sw \"al\""
			})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["totalResults"], 1);
	assert_eq!(body["Resources"][0]["userName"], "alice");
}

#[tokio::test]
async fn patch_and_delete_user() {
	let app = setup().await;
	let created = app.create_user("carol").await;
	let id = created["id"].as_str().unwrap();

	let response = app
		.admin(
			Method::PATCH,
			&format!("/Users/{id}"),
			Some(json!({
				"schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
				"Operations": [{"op": "replace", "path": "active", "value": false}]
			})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await["active"], false);

	let response = app.admin(Method::DELETE, &format!("/Users/{id}"), None).await;
	assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_body_is_invalid_syntax() {
	let app = setup().await;
	let request = Request::builder()
		.method(Method::POST)
		.uri("/Users")
		.header(header::AUTHORIZATION, format!("Bearer {}", app.admin_secret))
		.header(header::CONTENT_TYPE, "application/scim+json")
		.body(Body::from("{not json"))
		.unwrap();
	let response = app.router.clone().oneshot(request).await.unwrap();

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let body = json_body(response).await;
	assert_eq!(body["scimType"], "invalidSyntax");
}

#[tokio::test]
async fn patch_without_patch_op_schema_is_rejected() {
	let app = setup().await;
	let created = app.create_user("frank").await;
	let id = created["id"].as_str().unwrap();

	let response = app
		.admin(
			Method::PATCH,
			&format!("/Users/{id}"),
			Some(json!({
				"Operations": [{"op": "replace", "path": "active", "value": false}]
			})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(response).await["scimType"], "invalidSyntax");

	let response = app
		.admin(
			Method::PATCH,
			&format!("/Users/{id}"),
			Some(json!({
				"schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
				"Operations": [{"op": "remove"}]
			})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(response).await["scimType"], "invalidPath");

	let response = app.admin(Method::GET, &format!("/Users/{id}"), None).await;
	assert_eq!(json_body(response).await["active"], true);
}

#[tokio::test]
async fn group_lifecycle() {
	let app = setup().await;
	let user = app.create_user("dave").await;
	let user_id = user["id"].as_str().unwrap();

	let response = app
		.admin(
			Method::POST,
			"/Groups",
			Some(json!({
				"displayName": "Engineering",
				"members": [{"value": user_id}]
			})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let group = json_body(response).await;
	let group_id = group["id"].as_str().unwrap();
	assert_eq!(group["members"][0]["value"], user_id);

	let response = app
		.admin(
			Method::PATCH,
			&format!("/Groups/{group_id}"),
			Some(json!({
				"schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
				"Operations": [{"op": "remove", "path": format!("members[value eq \"{user_id}\"]")}]
			})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let patched = json_body(response).await;
	assert!(patched["members"]
		.as_array()
		.map(|m| m.is_empty())
		.unwrap_or(true));

	let response = app
		.admin(Method::DELETE, &format!("/Groups/{group_id}"), None)
		.await;
	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	let response = app
		.admin(Method::GET, &format!("/Groups/{group_id}"), None)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_processes_operations_in_order() {
	let app = setup().await;
	let response = app
		.admin(
			Method::POST,
			"/Bulk",
			Some(json!({
				"schemas": ["urn:ietf:params:scim:api:messages:2.0:BulkRequest"],
				"Operations": [
					{
						"method": "POST",
						"path": "/Users",
						"bulkId": "u1",
						"data": {"userName": "erin", "emails": [{"value": "erin@example.com"}]}
					},
					{
						"method": "POST",
						"path": "/Users",
						"bulkId": "u2",
						"data": {"emails": [{"value": "nobody@example.com"}]}
					}
				]
			})),
		)
		.await;

	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	let operations = body["Operations"].as_array().unwrap();
	assert_eq!(operations.len(), 2);
	assert_eq!(operations[0]["status"], "201");
	assert_eq!(operations[0]["bulkId"], "u1");
	assert_eq!(operations[1]["status"], "400");
}

#[tokio::test]
async fn oversized_bulk_payload_is_413() {
	let app = setup_with(AppConfig {
		options: ServiceOptions {
			max_bulk_payload_bytes: 128,
			..ServiceOptions::default()
		},
		..AppConfig::default()
	})
	.await;

	let operations: Vec<Value> = (0..10)
		.map(|i| {
			json!({
				"method": "POST",
				"path": "/Users",
				"bulkId": format!("b{i}"),
				"data": {"userName": format!("user{i}")}
			})
		})
		.collect();
	let response = app
		.admin(Method::POST, "/Bulk", Some(json!({"Operations": operations})))
		.await;

	assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
	let body = json_body(response).await;
	assert_eq!(body["status"], "413");
}

#[tokio::test]
async fn tenant_rate_limit_returns_429() {
	let app = setup_with(AppConfig {
		rate_per_second: 1,
		rate_burst: 1,
		..AppConfig::default()
	})
	.await;

	let first = app.admin(Method::GET, "/Users", None).await;
	assert_eq!(first.status(), StatusCode::OK);

	let second = app.admin(Method::GET, "/Users", None).await;
	assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn scoped_token_cannot_write_or_administer() {
	let app = setup().await;
	let response = app
		.admin(
			Method::POST,
			"/admin/tokens",
			Some(json!({"name": "reader", "scopes": ["users:read"]})),
		)
		.await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let issued = json_body(response).await;
	let secret = issued["secret"].as_str().unwrap().to_string();

	let read = app.send(Method::GET, "/Users", Some(&secret), None).await;
	assert_eq!(read.status(), StatusCode::OK);

	let write = app
		.send(
			Method::POST,
			"/Users",
			Some(&secret),
			Some(json!({"userName": "mallory", "emails": [{"value": "m@example.com"}]})),
		)
		.await;
	assert_eq!(write.status(), StatusCode::FORBIDDEN);

	let stats = app.send(Method::GET, "/admin/stats", Some(&secret), None).await;
	assert_eq!(stats.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rotated_token_replaces_the_old_secret() {
	let app = setup().await;
	let response = app
		.admin(Method::POST, "/admin/tokens", Some(json!({"name": "idp"})))
		.await;
	let issued = json_body(response).await;
	let old_secret = issued["secret"].as_str().unwrap().to_string();
	let token_id = issued["token"]["id"].as_str().unwrap().to_string();

	let response = app
		.admin(Method::POST, &format!("/admin/tokens/{token_id}/rotate"), None)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let rotated = json_body(response).await;
	let new_secret = rotated["secret"].as_str().unwrap().to_string();
	assert_ne!(old_secret, new_secret);

	let old = app.send(Method::GET, "/Users", Some(&old_secret), None).await;
	assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
	let new = app.send(Method::GET, "/Users", Some(&new_secret), None).await;
	assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn revoked_token_is_rejected() {
	let app = setup().await;
	let response = app
		.admin(Method::POST, "/admin/tokens", Some(json!({"name": "temp"})))
		.await;
	let issued = json_body(response).await;
	let secret = issued["secret"].as_str().unwrap().to_string();
	let token_id = issued["token"]["id"].as_str().unwrap().to_string();

	let response = app
		.admin(Method::DELETE, &format!("/admin/tokens/{token_id}"), None)
		.await;
	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	let response = app.send(Method::GET, "/Users", Some(&secret), None).await;
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stats_report_per_endpoint_latency() {
	let app = setup().await;
	app.admin(Method::GET, "/Users", None).await;
	app.admin(Method::GET, "/Users", None).await;

	let response = app.admin(Method::GET, "/admin/stats", None).await;
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["backend"], "organization");

	let endpoints = body["endpoints"].as_array().unwrap();
	let users = endpoints
		.iter()
		.find(|e| e["endpoint"] == "GET /Users")
		.unwrap();
	assert_eq!(users["count"], 2);
	assert_eq!(users["errors"], 0);
}

#[tokio::test]
async fn discovery_endpoints() {
	let app = setup().await;

	let response = app.admin(Method::GET, "/ServiceProviderConfig", None).await;
	assert_eq!(response.status(), StatusCode::OK);
	let config = json_body(response).await;
	assert_eq!(config["bulk"]["supported"], true);
	assert_eq!(config["patch"]["supported"], true);

	let response = app.admin(Method::GET, "/ResourceTypes", None).await;
	let types = json_body(response).await;
	assert_eq!(types["totalResults"], 2);

	let response = app.admin(Method::GET, "/ResourceTypes/Device", None).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_settings_round_trip() {
	let app = setup().await;
	let response = app.admin(Method::GET, "/admin/settings", None).await;
	assert_eq!(response.status(), StatusCode::OK);
	let mut settings = json_body(response).await;
	settings["prevent_duplicates"] = json!(false);

	let response = app
		.admin(Method::PUT, "/admin/settings", Some(settings))
		.await;
	assert_eq!(response.status(), StatusCode::OK);

	let response = app.admin(Method::GET, "/admin/settings", None).await;
	assert_eq!(json_body(response).await["prevent_duplicates"], false);
}
