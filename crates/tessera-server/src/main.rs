// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tessera provisioning server binary.

use std::path::PathBuf;

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use tessera_server::{build_state, create_router};
use tessera_server_auth::{ProvisioningScope, TenantId};
use tessera_server_config::{LoggingConfig, ServerConfig};
use tessera_server_provisioning::RequestContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tessera - SCIM 2.0 provisioning server.
#[derive(Parser, Debug)]
#[command(name = "tessera-server", about = "SCIM 2.0 provisioning server", version)]
struct Args {
	/// Path to a TOML configuration file.
	#[arg(long, env = "TESSERA_CONFIG", global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP server (default)
	Serve,
	/// Issue a provisioning token and print its secret once
	IssueToken {
		/// Tenant the token is bound to
		#[arg(long)]
		tenant: TenantId,
		#[arg(long, default_value = "bootstrap")]
		name: String,
		/// Repeatable. Defaults to every protocol scope.
		#[arg(long = "scope")]
		scopes: Vec<ProvisioningScope>,
		/// Lifetime in days. Omit for a non-expiring token.
		#[arg(long)]
		expires_in_days: Option<i64>,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = tessera_server_config::load_config(args.config)?;
	init_tracing(&config.logging);

	match args.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(config).await,
		Command::IssueToken {
			tenant,
			name,
			scopes,
			expires_in_days,
		} => issue_token(config, tenant, &name, scopes, expires_in_days).await,
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);

	if logging.json {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting tessera-server"
	);

	let pool = tessera_server_db::create_pool(&config.database.url).await?;
	tessera_server_db::apply_schema(&pool).await?;

	let state = build_state(&config, pool)?;
	let app = create_router(&config, state);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}

async fn issue_token(
	config: ServerConfig,
	tenant: TenantId,
	name: &str,
	scopes: Vec<ProvisioningScope>,
	expires_in_days: Option<i64>,
) -> anyhow::Result<()> {
	let pool = tessera_server_db::create_pool(&config.database.url).await?;
	tessera_server_db::apply_schema(&pool).await?;

	let state = build_state(&config, pool)?;
	let expires_at = expires_in_days.map(|days| Utc::now() + ChronoDuration::days(days));
	let issued = state
		.tokens
		.issue(&RequestContext::system(tenant), name, scopes, expires_at)
		.await?;

	let scopes: Vec<&str> = issued.token.scopes.iter().map(|s| s.as_str()).collect();
	println!("token id: {}", issued.token.id);
	println!("tenant:   {}", issued.token.tenant_id);
	println!("scopes:   {}", scopes.join(" "));
	println!("secret:   {}", issued.secret.expose());
	println!();
	println!("The secret is shown once. Store it in your identity provider now.");
	Ok(())
}
