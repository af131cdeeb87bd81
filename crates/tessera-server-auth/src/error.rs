// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
	#[error("token hashing failed: {0}")]
	Hash(String),

	#[error("unknown scope: {0}")]
	UnknownScope(String),
}
