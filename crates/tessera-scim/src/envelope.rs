// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

pub const SCHEMA_LIST_RESPONSE: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const SCHEMA_SEARCH_REQUEST: &str = "urn:ietf:params:scim:api:messages:2.0:SearchRequest";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
	pub schemas: Vec<String>,
	pub total_results: usize,
	pub items_per_page: usize,
	pub start_index: usize,
	#[serde(rename = "Resources")]
	pub resources: Vec<T>,
}

impl<T> ListResponse<T> {
	pub fn new(resources: Vec<T>, total_results: usize, start_index: usize) -> Self {
		Self {
			schemas: vec![SCHEMA_LIST_RESPONSE.to_string()],
			total_results,
			items_per_page: resources.len(),
			start_index,
			resources,
		}
	}

	/// A list containing every resource, used for discovery endpoints.
	pub fn complete(resources: Vec<T>) -> Self {
		let total = resources.len();
		Self::new(resources, total, 1)
	}
}

/// Body of `POST /.search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	#[serde(default)]
	pub schemas: Vec<String>,
	#[serde(default)]
	pub filter: Option<String>,
	#[serde(default)]
	pub start_index: Option<usize>,
	#[serde(default)]
	pub count: Option<usize>,
}
