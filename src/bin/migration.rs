use reservation_api::migrator::{run_migration, Migrator};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite://reservations.db?mode=rwc";

/// `migration [up|down]`; the database comes from `DATABASE_URL` or `APP__DATABASE_URL`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("APP__DATABASE_URL"))
        .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    match std::env::args().nth(1).as_deref() {
        None | Some("up") => run_migration(&database_url).await?,
        Some("down") => {
            info!("Rolling back every migration");
            let db = Database::connect(database_url.as_str()).await?;
            Migrator::down(&db, None).await?;
            info!("Rollback completed");
        }
        Some(other) => anyhow::bail!("unknown command {other:?}; expected `up` or `down`"),
    }

    Ok(())
}
