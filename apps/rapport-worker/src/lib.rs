pub mod worker;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rapport_service::{LiveHub, RapportService};
use rapport_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = rapport_cli::VERSION,
	about = rapport_cli::WORKER_ABOUT,
	rename_all = "kebab",
	styles = rapport_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = rapport_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();
	tracing::info!(version = rapport_cli::VERSION, "Rapport worker starting.");

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let service = RapportService::new(config, db, Arc::new(LiveHub::default()));

	worker::run_worker(&service).await
}
