// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit events for provisioning activity.
//!
//! [`AuditService::log`] never blocks and never fails the caller: entries go
//! onto a bounded queue drained by a background task that fans out to every
//! [`AuditSink`] whose filter accepts the entry.

pub mod error;
pub mod event;
pub mod filter;
pub mod pipeline;
pub mod sink;

pub use error::AuditSinkError;
pub use event::{AuditEventType, AuditLogBuilder, AuditLogEntry, AuditOutcome, AuditSeverity};
pub use filter::AuditFilterConfig;
pub use pipeline::AuditService;
pub use sink::{AuditSink, ProvisioningLogSink, TracingAuditSink};
