// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Instant;

use axum::{
	extract::{MatchedPath, Request, State},
	http::{header, HeaderMap},
	middleware::Next,
	response::Response,
};
use tessera_server_provisioning::{ProvisioningError, RequestContext};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::ScimState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authenticates the bearer token, applies the tenant rate limit and attaches
/// a [`RequestContext`] for the handlers.
///
/// A missing or malformed header is rejected before any token lookup.
pub async fn scim_auth_middleware(
	State(state): State<ScimState>,
	mut request: Request,
	next: Next,
) -> Result<Response, ApiError> {
	let Some(token) = bearer_token(request.headers()) else {
		warn!("SCIM auth failed: missing or malformed Authorization header");
		state.metrics.record_auth_failure("malformed_header");
		return Err(ProvisioningError::Authentication.into());
	};

	let token = state.tokens.validate(token).await?;

	if let Err(e) = state.rate_limiter.check(&token.tenant_id) {
		state.metrics.record_rate_limited();
		warn!(tenant_id = %token.tenant_id, "SCIM request rate limited");
		return Err(e.into());
	}

	let request_id = request
		.headers()
		.get(REQUEST_ID_HEADER)
		.and_then(|v| v.to_str().ok())
		.filter(|v| !v.is_empty() && v.len() <= 128)
		.map(str::to_string)
		.unwrap_or_else(|| Uuid::new_v4().to_string());

	let mut ctx = RequestContext::for_token(&token).with_request_id(request_id);
	if let Some(timeout) = state.request_timeout {
		ctx = ctx.with_timeout(timeout);
	}
	debug!(tenant_id = %ctx.tenant_id, request_id = %ctx.request_id, "SCIM request authenticated");

	// Dropping the guard cancels in-flight backend calls if the client goes away.
	let _guard = ctx.cancellation().clone().drop_guard();
	request.extensions_mut().insert(ctx);
	Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = value.split_once(' ')?;
	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}
	let token = token.trim();
	(!token.is_empty()).then_some(token)
}

/// Records per-endpoint latency and outcome, keyed by method and route.
pub async fn track_requests(State(state): State<ScimState>, request: Request, next: Next) -> Response {
	let endpoint = match request.extensions().get::<MatchedPath>() {
		Some(path) => format!("{} {}", request.method(), path.as_str()),
		None => format!("{} <unmatched>", request.method()),
	};
	let started = Instant::now();
	let response = next.run(request).await;
	let success = response.status().as_u16() < 400;
	state.metrics.record_request(&endpoint, started.elapsed(), success);
	response
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	fn headers(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
		headers
	}

	#[test]
	fn bearer_token_parsing() {
		assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
		assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
		assert_eq!(bearer_token(&headers("Basic abc")), None);
		assert_eq!(bearer_token(&headers("Bearer")), None);
		assert_eq!(bearer_token(&headers("Bearer   ")), None);
		assert_eq!(bearer_token(&HeaderMap::new()), None);
	}
}
