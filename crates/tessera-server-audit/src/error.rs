// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_server_db::DbError;

/// Reported by a sink to the pipeline, which logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum AuditSinkError {
	#[error("audit storage failed: {0}")]
	Storage(#[from] DbError),

	#[error("audit sink unavailable: {0}")]
	Unavailable(String),
}
