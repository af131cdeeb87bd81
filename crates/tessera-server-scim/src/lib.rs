// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SCIM 2.0 HTTP surface.
//!
//! Every route sits behind bearer authentication. Protocol routes answer in
//! `application/scim+json`; the `/admin` routes answer in plain JSON and need
//! the `admin` scope.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::scim_routes;
pub use state::ScimState;
