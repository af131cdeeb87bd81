// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Tessera provisioning server.
//!
//! Sources are merged in precedence order: built-in defaults, an optional
//! TOML file, then `TESSERA_*` environment variables.
//!
//! ```ignore
//! use tessera_server_config::load_config;
//!
//! let config = load_config(None)?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{
	load_secret_env, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub scim: ScimConfig,
	pub audit: AuditConfig,
	pub webhook: Option<WebhookConfig>,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}

	/// Absolute URL prefix for `meta.location`.
	pub fn scim_base_url(&self) -> String {
		format!("{}{}", self.http.base_url, self.scim.base_path)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// When `config_path` is `None` the system file `/etc/tessera/server.toml`
/// is consulted.
pub fn load_config(config_path: Option<PathBuf>) -> Result<ServerConfig, ConfigError> {
	let toml = match config_path {
		Some(path) => TomlSource::new(path),
		None => TomlSource::system(),
	};

	let mut sources: Vec<Box<dyn ConfigSource>> =
		vec![Box::new(DefaultsSource), Box::new(toml), Box::new(EnvSource)];

	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize a merged layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let scim = layer.scim.unwrap_or_default().finalize();
	let audit = layer.audit.unwrap_or_default().finalize();

	let webhook_secret = load_secret_env("TESSERA_WEBHOOK_SECRET")?;
	let webhook = layer.webhook.unwrap_or_default().finalize(webhook_secret);

	validate_config(&scim, &audit)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		scim_enabled = scim.enabled,
		scim_backend = %scim.backend,
		webhook_configured = webhook.is_some(),
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		logging,
		scim,
		audit,
		webhook,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(scim: &ScimConfig, audit: &AuditConfig) -> Result<(), ConfigError> {
	if scim.max_results == 0 {
		return Err(ConfigError::Validation(
			"scim.max_results must be greater than zero".to_string(),
		));
	}
	if scim.default_page_size == 0 || scim.default_page_size > scim.max_results {
		return Err(ConfigError::Validation(format!(
			"scim.default_page_size must be between 1 and max_results ({})",
			scim.max_results
		)));
	}
	if scim.max_bulk_operations == 0 || scim.max_bulk_payload_bytes == 0 {
		return Err(ConfigError::Validation(
			"scim bulk limits must be greater than zero".to_string(),
		));
	}
	if scim.rate_limit_per_second == 0 || scim.rate_limit_burst < scim.rate_limit_per_second {
		return Err(ConfigError::Validation(
			"scim.rate_limit_burst must be at least rate_limit_per_second, which must be non-zero"
				.to_string(),
		));
	}
	if audit.queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"audit.queue_capacity must be greater than zero".to_string(),
		));
	}

	Ok(())
}
