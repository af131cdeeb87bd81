// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// An environment variable or TOML key did not parse.
	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("cannot parse {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("cannot read {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The merged configuration breaks a cross-field rule.
	#[error("invalid configuration: {0}")]
	Validation(String),

	#[error("secret: {0}")]
	Secret(String),
}
