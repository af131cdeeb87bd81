// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod admin;
pub mod bulk;
pub mod discovery;
pub mod groups;
pub mod users;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::extract::ScimJson;

/// `201 Created` with a `Location` header pointing at the new resource.
pub(crate) fn created<T: Serialize>(location: Option<&str>, body: T) -> Response {
	let mut response = (StatusCode::CREATED, ScimJson(body)).into_response();
	if let Some(value) = location.and_then(|l| HeaderValue::from_str(l).ok()) {
		response.headers_mut().insert(header::LOCATION, value);
	}
	response
}
