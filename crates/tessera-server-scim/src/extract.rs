// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_server_provisioning::ProvisioningError;

use crate::error::ApiError;

pub const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// JSON body in and out of protocol routes.
///
/// As an extractor, malformed bodies become `invalidSyntax` errors instead of
/// axum's plain-text rejections. As a response, the content type is
/// `application/scim+json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScimJson<T>(pub T);

impl<T, S> FromRequest<S> for ScimJson<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		match Json::<T>::from_request(req, state).await {
			Ok(Json(value)) => Ok(ScimJson(value)),
			Err(rejection) => Err(ApiError(ProvisioningError::invalid_syntax(rejection.body_text()))),
		}
	}
}

impl<T: Serialize> IntoResponse for ScimJson<T> {
	fn into_response(self) -> Response {
		let mut response = Json(self.0).into_response();
		response.headers_mut().insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static(SCIM_CONTENT_TYPE),
		);
		response
	}
}
