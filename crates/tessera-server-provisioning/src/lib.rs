// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # tessera-server-provisioning
//!
//! The provisioning engine behind the SCIM surface.
//!
//! - [`TokenAuthority`] issues and validates bearer tokens.
//! - [`PatchEngine`] turns patch operations into account updates and team
//!   membership changes.
//! - [`OrgAdapter`] hides which organization backend holds memberships and
//!   teams. [`AppOrgAdapter`] and [`OrganizationOrgAdapter`] are the two
//!   implementations; one is chosen when the service is built.
//! - [`BulkCoordinator`] runs bulk requests in order with a failure threshold.
//! - [`ProvisioningService`] ties these together for users and groups.
//!
//! Webhook and audit delivery run after the primary mutation through
//! [`SideEffects`] and never fail the request that triggered them.

pub mod attribute_map;
pub mod bulk;
pub mod context;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod org_adapter;
pub mod patch;
pub mod rate_limit;
pub mod service;
pub mod side_effects;
pub mod token_authority;

pub use attribute_map::{AccountField, AttributeMap};
pub use bulk::{BulkAction, BulkCoordinator, BulkOutcome, BulkTarget, ResourceKind};
pub use context::RequestContext;
pub use error::{ProvisioningError, Result};
pub use identity::{Account, IdentityError, IdentityStore, InMemoryIdentityStore, NewAccount};
pub use metrics::{EndpointStats, ProvisioningMetrics};
pub use org_adapter::{
	AppOrgAdapter, InMemoryAppBackend, InMemoryOrgBackend, MemberPage, MemberRef, OrgAdapter,
	OrgAdapterError, OrganizationOrgAdapter, TeamRef,
};
pub use patch::{GroupPatchPlan, MemberChange, MembershipDelta, PatchEngine, UserPatchPlan};
pub use rate_limit::TenantRateLimiter;
pub use service::{ListQuery, ProvisioningService, ServiceDeps, ServiceOptions};
pub use side_effects::{
	HttpWebhookDispatcher, NoopWebhookDispatcher, ProvisioningEvent, SideEffects, WebhookDispatcher,
	WebhookError,
};
pub use token_authority::{IssuedToken, RejectReason, TokenAuthority};
