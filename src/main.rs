use clap::Parser;
use dotenv::dotenv;
use instance_backfill::config::{BackfillConfig, Environment, DEFAULT_PARSE_LIMIT, DEFAULT_POOL_SIZE};
use instance_backfill::document_store::ParseDocumentStore;
use instance_backfill::postgres_store::PostgresTargetStore;
use instance_backfill::{Backfiller, BackfillError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "instance_backfill")]
#[command(about = "Backfill book instance ids across the analytics tables", long_about = None)]
struct Cli {
    /// Selects the Parse server, schemas and tables
    #[arg(long, env = "BACKFILL_ENV", value_enum, default_value_t = Environment::Dev)]
    environment: Environment,
    /// Actually run the updates instead of only reporting them
    #[arg(long, env = "BACKFILL_EXECUTE", default_value_t = false)]
    execute: bool,
    #[arg(long, env = "PARSE_URL")]
    parse_url: Option<String>,
    #[arg(long, env = "PARSE_APP_ID")]
    parse_app_id: Option<String>,
    #[arg(long, env = "BACKFILL_PARSE_LIMIT", default_value_t = DEFAULT_PARSE_LIMIT)]
    parse_limit: usize,
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "BACKFILL_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: u32,
    /// Send each table's batch as one multi-statement string
    #[arg(long, env = "BACKFILL_TEXT_BATCHES", default_value_t = false)]
    text_batches: bool,
    /// Write ambiguous titles and their ids to this JSON file
    #[arg(long, env = "BACKFILL_AMBIGUOUS_REPORT")]
    ambiguous_report: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<BackfillConfig, BackfillError> {
        let mut config = BackfillConfig::for_environment(self.environment, self.parse_app_id, &self.database_url)?;
        if let Some(url) = self.parse_url {
            config.document_store.url = url;
        }
        config.document_store.limit = self.parse_limit;
        config.really_run_update = self.execute;
        config.pool_size = self.pool_size;
        config.text_batches = self.text_batches;
        config.ambiguous_report = self.ambiguous_report;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), BackfillError> {
    dotenv().ok();
    instance_backfill::init_tracing("instance-backfill");
    let config = Cli::parse().into_config()?;

    let documents = ParseDocumentStore::new(config.document_store.clone())?;
    let store = PostgresTargetStore::connect(&config).await?;

    let result = Backfiller::new(&config, &documents, &store).run().await;
    store.close();

    if let Err(e) = &result {
        tracing::error!("backfill failed: {}", e);
    }
    result.map(|_| ())
}
