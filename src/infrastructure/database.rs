use crate::config::{MetadataBackend, TransferConfig};
use crate::entities::kv_entries;
use crate::services::kv::{MemoryMetadataStore, MetadataStore, SqlMetadataStore};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn connect(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Metadata database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    run_migrations(&db).await?;

    info!("✅ Metadata database connected successfully");
    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmt = schema
        .create_table_from_entity(kv_entries::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&stmt)).await?;

    Ok(())
}

/// Builds the metadata store. Connection failures leave it unconfigured:
/// files are then served without metadata.
pub async fn setup_metadata_store(config: &TransferConfig) -> Option<Arc<dyn MetadataStore>> {
    match config.metadata_backend {
        MetadataBackend::None => {
            warn!("⚠️ Metadata store disabled, short links and expiration are off");
            None
        }
        MetadataBackend::Memory => {
            info!("🧠 Metadata store: in-memory");
            Some(Arc::new(MemoryMetadataStore::new()))
        }
        MetadataBackend::Sql => match connect(&config.metadata_database_url).await {
            Ok(db) => Some(Arc::new(SqlMetadataStore::new(db))),
            Err(e) => {
                warn!("⚠️ Metadata store unavailable, continuing without it: {:#}", e);
                None
            }
        },
    }
}
