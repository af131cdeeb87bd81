// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tessera_server_provisioning::ProvisioningError;
use tracing::error;

use crate::extract::ScimJson;

/// The only place a [`ProvisioningError`] becomes an HTTP response.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ProvisioningError);

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status =
			StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		if status.is_server_error() {
			error!(error = %self.0, "request failed");
		}

		let mut response = (status, ScimJson(self.0.to_scim_response())).into_response();
		if status == StatusCode::UNAUTHORIZED {
			response
				.headers_mut()
				.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
		}
		response
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn internal_detail_is_withheld() {
		let response = ApiError(ProvisioningError::Internal("disk on fire".to_string())).into_response();
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn unauthorized_carries_challenge() {
		let response = ApiError(ProvisioningError::Authentication).into_response();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
		assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
		assert_eq!(
			response.headers()[header::CONTENT_TYPE],
			crate::extract::SCIM_CONTENT_TYPE
		);
	}
}
