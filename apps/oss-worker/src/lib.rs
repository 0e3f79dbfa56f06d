pub mod worker;

// std
use std::{path::PathBuf, sync::Arc, time::Duration};

// crates.io
use clap::Parser;
use tracing_subscriber::EnvFilter;

// self
use oss_provider::gmail::GmailProvider;
use oss_service::OssService;
use oss_storage::db::Db;

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

	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema().await?;
	let blobs = oss_blob::build_blob_store(&config.storage.blob)?;
	let provider = Arc::new(GmailProvider::new(
		&config.provider.api_base,
		Duration::from_millis(config.provider.timeout_ms),
	)?);
	let service = Arc::new(OssService::new(config, db, blobs, provider)?);

	worker::run_worker(service).await
}
