// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process wiring for the Tessera provisioning server.
//!
//! Everything here runs once at startup: the metrics collector, the audit
//! pipeline, the webhook dispatcher and the organization backend are built a
//! single time and handed to the components that need them.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	http::{header, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Router,
};
use sqlx::SqlitePool;
use tessera_server_audit::{
	AuditFilterConfig, AuditService, AuditSink, ProvisioningLogSink, TracingAuditSink,
};
use tessera_server_config::{ScimBackend, ScimDeleteMode, ServerConfig};
use tessera_server_db::{
	DeleteMode, MappingRepository, ProvisioningLogRepository, TenantSettings,
	TenantSettingsRepository, TokenRepository,
};
use tessera_server_provisioning::{
	AppOrgAdapter, HttpWebhookDispatcher, InMemoryAppBackend, InMemoryIdentityStore,
	InMemoryOrgBackend, NoopWebhookDispatcher, OrgAdapter, OrganizationOrgAdapter,
	ProvisioningMetrics, ProvisioningService, ServiceDeps, ServiceOptions, SideEffects,
	TenantRateLimiter, TokenAuthority, WebhookDispatcher,
};
use tessera_server_scim::{scim_routes, ScimState};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// How often idle per-tenant rate limit buckets are swept.
const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Builds the shared SCIM state from configuration.
///
/// Must be called inside a tokio runtime; the audit pipeline fan-out and the
/// rate limit sweeper are spawned here.
pub fn build_state(config: &ServerConfig, pool: SqlitePool) -> anyhow::Result<ScimState> {
	let metrics = Arc::new(ProvisioningMetrics::new()?);
	let side_effects = build_side_effects(config, &pool, metrics.clone())?;
	let mappings = Arc::new(MappingRepository::new(pool.clone()));

	let service = ProvisioningService::new(
		ServiceDeps {
			identity: Arc::new(InMemoryIdentityStore::new()),
			org: org_adapter(config.scim.backend),
			group_mappings: mappings.clone(),
			user_mappings: mappings.clone(),
			attribute_mappings: mappings,
			settings: Arc::new(TenantSettingsRepository::new(pool.clone())),
			logs: Arc::new(ProvisioningLogRepository::new(pool.clone())),
			side_effects: side_effects.clone(),
			metrics: metrics.clone(),
		},
		service_options(config),
	);
	info!(backend = service.backend_name(), "provisioning service ready");

	let tokens = Arc::new(TokenAuthority::new(
		Arc::new(TokenRepository::new(pool)),
		metrics.clone(),
		side_effects,
	));

	let request_timeout =
		(config.scim.request_timeout_secs > 0).then(|| Duration::from_secs(config.scim.request_timeout_secs));

	let rate_limiter = Arc::new(TenantRateLimiter::new(
		config.scim.rate_limit_per_second,
		config.scim.rate_limit_burst,
	));
	TenantRateLimiter::spawn_eviction(&rate_limiter, RATE_LIMIT_SWEEP_INTERVAL);

	Ok(ScimState {
		service: Arc::new(service),
		tokens,
		rate_limiter,
		metrics,
		request_timeout,
	})
}

/// Maps the resolved configuration onto service options.
pub fn service_options(config: &ServerConfig) -> ServiceOptions {
	let delete_mode = match config.scim.delete_mode {
		ScimDeleteMode::Soft => DeleteMode::Soft,
		ScimDeleteMode::Hard => DeleteMode::Hard,
	};

	ServiceOptions {
		base_url: config.scim_base_url(),
		max_results: config.scim.max_results,
		default_page_size: config.scim.default_page_size,
		max_bulk_operations: config.scim.max_bulk_operations,
		max_bulk_payload_bytes: config.scim.max_bulk_payload_bytes,
		default_settings: TenantSettings {
			delete_mode,
			..TenantSettings::default()
		},
	}
}

fn org_adapter(backend: ScimBackend) -> Arc<dyn OrgAdapter> {
	match backend {
		ScimBackend::App => Arc::new(AppOrgAdapter::new(Arc::new(InMemoryAppBackend::new()))),
		ScimBackend::Organization => Arc::new(OrganizationOrgAdapter::new(Arc::new(
			InMemoryOrgBackend::new(),
		))),
	}
}

fn build_side_effects(
	config: &ServerConfig,
	pool: &SqlitePool,
	metrics: Arc<ProvisioningMetrics>,
) -> anyhow::Result<SideEffects> {
	let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(ProvisioningLogSink::new(Arc::new(
		ProvisioningLogRepository::new(pool.clone()),
	)))];
	if config.audit.log_to_tracing {
		sinks.push(Arc::new(TracingAuditSink::new(AuditFilterConfig::default())));
	}
	let audit = Arc::new(AuditService::new(config.audit.queue_capacity, sinks));

	let webhook: Arc<dyn WebhookDispatcher> = match &config.webhook {
		Some(webhook) => {
			info!(url = %webhook.url, signed = webhook.secret.is_some(), "webhook delivery enabled");
			Arc::new(HttpWebhookDispatcher::new(
				webhook.url.clone(),
				webhook.secret.clone(),
				Duration::from_secs(webhook.timeout_secs),
			)?)
		}
		None => Arc::new(NoopWebhookDispatcher),
	};

	Ok(SideEffects::new(Some(audit), webhook, metrics))
}

/// Top-level router: health, Prometheus metrics and the SCIM surface under
/// the configured base path.
pub fn create_router(config: &ServerConfig, state: ScimState) -> Router {
	let metrics = state.metrics.clone();
	let mut router = Router::new()
		.route("/health", get(health))
		.route(
			"/metrics",
			get(move || {
				let metrics = metrics.clone();
				async move { prometheus_metrics(&metrics) }
			}),
		);

	if config.scim.enabled {
		router = router.nest(&config.scim.base_path, scim_routes(state));
		info!(base_path = %config.scim.base_path, "SCIM endpoints enabled");
	} else {
		warn!("SCIM disabled by configuration");
	}

	router.layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
	"ok"
}

fn prometheus_metrics(metrics: &ProvisioningMetrics) -> Response {
	match metrics.gather_metrics() {
		Ok(body) => (
			[(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
			body,
		)
			.into_response(),
		Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use tessera_server_auth::{ProvisioningScope, TenantId};
	use tessera_server_config::ServerConfigLayer;
	use tessera_server_db::testing::create_test_pool;
	use tessera_server_provisioning::RequestContext;
	use tower::ServiceExt;

	fn config() -> ServerConfig {
		tessera_server_config::finalize(ServerConfigLayer::default()).unwrap()
	}

	#[test]
	fn options_follow_config() {
		let mut config = config();
		config.scim.delete_mode = ScimDeleteMode::Hard;
		config.scim.max_results = 50;

		let options = service_options(&config);
		assert_eq!(options.default_settings.delete_mode, DeleteMode::Hard);
		assert!(options.default_settings.prevent_duplicates);
		assert_eq!(options.max_results, 50);
		assert!(options.base_url.ends_with("/scim/v2"));
	}

	#[tokio::test]
	async fn health_and_metrics_are_public() {
		let config = config();
		let state = build_state(&config, create_test_pool().await).unwrap();
		let router = create_router(&config, state);

		let response = router
			.clone()
			.oneshot(Request::get("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let response = router
			.oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn scim_is_mounted_under_base_path() {
		let config = config();
		let state = build_state(&config, create_test_pool().await).unwrap();
		let issued = state
			.tokens
			.issue(
				&RequestContext::system(TenantId::generate()),
				"bootstrap",
				vec![ProvisioningScope::Admin],
				None,
			)
			.await
			.unwrap();
		let router = create_router(&config, state);

		let request = Request::get("/scim/v2/Users")
			.header(header::AUTHORIZATION, format!("Bearer {}", issued.secret.expose()))
			.body(Body::empty())
			.unwrap();
		let response = router.clone().oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(body["totalResults"], 0);

		let response = router
			.oneshot(Request::get("/scim/v2/Users").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn disabled_scim_is_not_mounted() {
		let mut config = config();
		config.scim.enabled = false;
		let state = build_state(&config, create_test_pool().await).unwrap();
		let router = create_router(&config, state);

		let response = router
			.oneshot(Request::get("/scim/v2/Users").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}
}
