// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hotlist ranking node binary.

use clap::Parser;
use hotlist_server::Node;
use hotlist_server_config::LogFormat;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hotlist node: computes the hot-article ranking when elected and runs
/// due jobs from the shared job store.
#[derive(Parser, Debug)]
#[command(name = "hotlist-server", about = "Hotlist ranking node", version)]
struct Args {
	/// Config file; defaults to /etc/hotlist/server.toml
	#[arg(long, short, env = "HOTLIST_CONFIG")]
	config: Option<PathBuf>,

	/// Overrides node.id from the config
	#[arg(long)]
	node_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	dotenvy::dotenv().ok();

	let mut config = match &args.config {
		Some(path) => hotlist_server_config::load_config_with_file(path)?,
		None => hotlist_server_config::load_config()?,
	};
	if let Some(node_id) = args.node_id {
		config.node.id = node_id;
	}

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match config.logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}

	tracing::info!(
		node_id = %config.node.id,
		database = %config.database.url,
		"starting hotlist-server"
	);

	let pool = hotlist_db::create_pool(&config.database.url).await?;
	hotlist_db::run_migrations(&pool).await?;

	let node = Node::start(&config, pool.clone()).await?;

	tokio::signal::ctrl_c().await?;
	tracing::info!("Received shutdown signal");
	node.shutdown().await;
	pool.close().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}
