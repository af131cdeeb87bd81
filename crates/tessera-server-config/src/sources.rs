// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tessera_server_auth::SecretString;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuditConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, ScimConfigLayer,
	WebhookConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tessera/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TESSERA_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()),
			logging: Some(load_logging_from_env()),
			scim: Some(load_scim_from_env()?),
			audit: Some(load_audit_from_env()?),
			webhook: Some(load_webhook_from_env()?),
		})
	}
}

/// Load a secret from `VAR`, or from the file named by `VAR_FILE`.
///
/// `VAR_FILE` wins when both are set. A single trailing newline is stripped
/// from file contents.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, ConfigError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = std::env::var(&file_var) {
		if path_str.is_empty() {
			return Err(ConfigError::Secret(format!("{file_var} is set but empty")));
		}

		let path = PathBuf::from(&path_str);
		let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
			path: path.clone(),
			source: e,
		})?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(SecretString::new(secret)));
	}

	Ok(env_var(var).map(SecretString::new))
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid value '{v}': {e}"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("TESSERA_HTTP_HOST"),
		port: env_parse("TESSERA_HTTP_PORT")?,
		base_url: env_var("TESSERA_HTTP_BASE_URL"),
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("TESSERA_DATABASE_URL"),
	}
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("TESSERA_LOGGING_LEVEL"),
		json: env_bool("TESSERA_LOGGING_JSON"),
	}
}

fn load_scim_from_env() -> Result<ScimConfigLayer, ConfigError> {
	Ok(ScimConfigLayer {
		enabled: env_bool("TESSERA_SCIM_ENABLED"),
		base_path: env_var("TESSERA_SCIM_BASE_PATH"),
		max_bulk_operations: env_parse("TESSERA_SCIM_MAX_BULK_OPERATIONS")?,
		max_bulk_payload_bytes: env_parse("TESSERA_SCIM_MAX_BULK_PAYLOAD_BYTES")?,
		max_results: env_parse("TESSERA_SCIM_MAX_RESULTS")?,
		default_page_size: env_parse("TESSERA_SCIM_DEFAULT_PAGE_SIZE")?,
		rate_limit_per_second: env_parse("TESSERA_SCIM_RATE_LIMIT_PER_SECOND")?,
		rate_limit_burst: env_parse("TESSERA_SCIM_RATE_LIMIT_BURST")?,
		backend: env_parse("TESSERA_SCIM_BACKEND")?,
		delete_mode: env_parse("TESSERA_SCIM_DELETE_MODE")?,
		request_timeout_secs: env_parse("TESSERA_SCIM_REQUEST_TIMEOUT_SECS")?,
	})
}

fn load_audit_from_env() -> Result<AuditConfigLayer, ConfigError> {
	Ok(AuditConfigLayer {
		queue_capacity: env_parse("TESSERA_AUDIT_QUEUE_CAPACITY")?,
		log_to_tracing: env_bool("TESSERA_AUDIT_LOG_TO_TRACING"),
	})
}

fn load_webhook_from_env() -> Result<WebhookConfigLayer, ConfigError> {
	Ok(WebhookConfigLayer {
		url: env_var("TESSERA_WEBHOOK_URL"),
		timeout_secs: env_parse("TESSERA_WEBHOOK_TIMEOUT_SECS")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_missing_toml_file_is_empty_layer() {
		let layer = TomlSource::new("/nonexistent/tessera.toml").load().unwrap();
		assert!(layer.http.is_none());
		assert!(layer.scim.is_none());
	}

	#[test]
	fn test_toml_file_loads_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[http]
port = 9443

[scim]
backend = "organization"
max_bulk_operations = 10
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.http.unwrap().port, Some(9443));
		assert_eq!(layer.scim.unwrap().max_bulk_operations, Some(10));
	}

	#[test]
	fn test_invalid_toml_reports_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[http\nport = ").unwrap();
		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_parse_reports_key() {
		std::env::set_var("TESSERA_TEST_ENV_PARSE_PORT", "not-a-port");
		let err = env_parse::<u16>("TESSERA_TEST_ENV_PARSE_PORT").unwrap_err();
		std::env::remove_var("TESSERA_TEST_ENV_PARSE_PORT");
		match err {
			ConfigError::InvalidValue { key, .. } => assert_eq!(key, "TESSERA_TEST_ENV_PARSE_PORT"),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn test_secret_from_file_strips_newline() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "s3cret").unwrap();
		std::env::set_var("TESSERA_TEST_SECRET_FILE", file.path());
		let secret = load_secret_env("TESSERA_TEST_SECRET").unwrap().unwrap();
		std::env::remove_var("TESSERA_TEST_SECRET_FILE");
		assert_eq!(secret.expose(), "s3cret");
	}

	#[test]
	fn test_secret_absent() {
		assert!(load_secret_env("TESSERA_TEST_SECRET_NEVER_SET")
			.unwrap()
			.is_none());
	}
}
