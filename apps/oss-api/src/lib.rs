pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use oss_provider::gmail::GmailProvider;
use oss_service::OssService;
use oss_storage::db::Db;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = oss_cli::VERSION,
	rename_all = "kebab",
	styles = oss_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = oss_config::load(&args.config)?;
	let filter = EnvFilter::try_new(&config.service.log_level)
		.unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;
	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema().await?;
	let blobs = oss_blob::build_blob_store(&config.storage.blob)?;
	let provider = Arc::new(GmailProvider::new(
		&config.provider.api_base,
		Duration::from_millis(config.provider.timeout_ms),
	)?);
	let service = Arc::new(OssService::new(config, db, blobs, provider)?);
	let state = AppState::new(service);
	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);

	let http_listener = TcpListener::bind(http_addr).await?;
	tracing::info!(%http_addr, "HTTP server listening.");
	let http_server = axum::serve(http_listener, app);

	let admin_listener = TcpListener::bind(admin_addr).await?;
	tracing::info!(%admin_addr, "Admin server listening.");
	let admin_server = axum::serve(admin_listener, admin_app);

	tokio::try_join!(http_server, admin_server)?;

	Ok(())
}
