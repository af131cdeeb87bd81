// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Primitives for provisioning bearer tokens.
//!
//! Tokens are 32 random bytes, base64url encoded. Only an Argon2 hash of the
//! full token and an 8-character lookup prefix are ever persisted. The
//! plaintext is wrapped in [`TokenSecret`] so it cannot be logged by accident.

mod argon2_config;
pub mod error;
pub mod secret;
pub mod token;
pub mod types;

pub use error::TokenError;
pub use secret::{Secret, SecretString, TokenSecret};
pub use token::{
	generate_token_secret, hash_token, lookup_prefix, verify_token, ProvisioningToken,
	TOKEN_BYTES, TOKEN_PREFIX_LEN,
};
pub use types::{AccountId, ProvisioningScope, TenantId, TokenId};
