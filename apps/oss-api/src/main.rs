use clap::Parser;

use oss_api::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	let args = Args::parse();
	oss_api::run(args).await
}
