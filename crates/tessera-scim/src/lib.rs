// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SCIM 2.0 protocol types shared by the provisioning engine and its HTTP surface.
//!
//! Nothing in this crate performs I/O. Resources, envelopes and discovery
//! documents are plain serde types; [`filter`] holds the single-clause filter
//! evaluator used to narrow list results.

pub mod bulk;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod patch;
pub mod resource;
pub mod schema;

pub use bulk::{BulkMethod, BulkOperationRequest, BulkOperationResponse, BulkRequest, BulkResponse};
pub use discovery::{ResourceType, SchemaExtension, ServiceProviderConfig};
pub use envelope::{ListResponse, SearchRequest};
pub use error::{ScimError, ScimErrorResponse, ScimErrorType};
pub use filter::{CompareOp, CompiledFilter, FailOpenReason, FilterExpression, FilterTarget};
pub use patch::{PatchOp, PatchOperation, PatchRequest};
pub use resource::{
	GroupMember, GroupReference, Meta, Name, ScimEmail, ScimGroup, ScimUser, SCHEMA_CORE_GROUP,
	SCHEMA_CORE_USER, SCHEMA_ENTERPRISE_USER,
};
pub use schema::{Schema, SchemaAttribute};
