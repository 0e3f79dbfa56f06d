use clap::Parser;

use oss_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	let args = Args::parse();
	oss_worker::run(args).await
}
