use storefront_api::{config, migrator};
use tracing::{error, info};

/// Applies pending schema migrations to `APP__DATABASE_URL` (or `DATABASE_URL`).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing("info", false);

    let database_url = std::env::var("APP__DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "sqlite://storefront.db?mode=rwc".to_string());

    info!("Starting database migration");

    if let Err(e) = migrator::run_migration(&database_url).await {
        error!(error = %e, "Migration run failed");
        return Err(e);
    }

    info!("Migration completed successfully");
    Ok(())
}
