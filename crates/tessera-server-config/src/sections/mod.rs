// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod audit;
mod database;
mod http;
mod logging;
mod scim;
mod webhook;

pub use audit::{AuditConfig, AuditConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use scim::{ScimBackend, ScimConfig, ScimConfigLayer, ScimDeleteMode};
pub use webhook::{WebhookConfig, WebhookConfigLayer};
