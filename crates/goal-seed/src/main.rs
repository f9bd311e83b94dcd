//! Seed tool for `goals_db`
//!
//! Creates the `goal_tracking` collection and inserts the starter goals.

use anyhow::Context;
use clap::Parser;
use goal_seed::{seed, PgGoalStore, SeedMode};
use shared::{db, DatabaseConfig};

#[derive(Debug, Parser)]
#[command(name = "seed-goals", version, about = "Insert the starter goals into goals_db")]
struct Args {
    /// Skip the insert when the collection already holds documents
    #[arg(long)]
    if_empty: bool,

    /// PostgreSQL URL; overrides the DB_* environment variables
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::init_tracing();

    let args = Args::parse();

    let mut config = match &args.database_url {
        Some(url) => DatabaseConfig {
            url: Some(url.clone()),
            ..DatabaseConfig::from_env().unwrap_or_else(|_| fallback_config())
        },
        None => DatabaseConfig::from_env().context("Failed to load database configuration")?,
    };
    config.max_connections = 1;

    let pool = db::create_pool(&config).await.map_err(|e| {
        tracing::error!(error = %e, database = %config.name, "Cannot reach goals database");
        e
    })?;

    let mode = if args.if_empty {
        SeedMode::IfEmpty
    } else {
        SeedMode::Always
    };

    let store = PgGoalStore::new(pool);
    let report = seed(&store, mode).await.context("Seeding goals failed")?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

/// Placeholder fields when only a URL is supplied; `connection_url` ignores them
fn fallback_config() -> DatabaseConfig {
    DatabaseConfig {
        host: String::new(),
        port: 5432,
        name: "goals_db".to_string(),
        user: String::new(),
        password: String::new(),
        max_connections: 1,
        acquire_timeout_secs: 5,
        ssl_mode: "prefer".to_string(),
        url: None,
    }
}
