use anyhow::Context;
use chrono::Utc;
use entities::local_kv;
use migration::MigratorTrait;
use sea_orm::{
    ActiveValue::Set, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    sea_query::OnConflict,
};

use super::LocalStore;

/// Key-value store on the `local_kv` table.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let mut opts = ConnectOptions::new(connection_string.to_string());
        opts.sqlx_logging(false);
        // every pooled connection to :memory: would see its own empty database
        if connection_string.contains(":memory:") {
            opts.max_connections(1).min_connections(1);
        }
        let db = Database::connect(opts)
            .await
            .with_context(|| "Failed to connect to database")?;
        migration::Migrator::up(&db, None)
            .await
            .with_context(|| "Failed to run database migrations")?;
        tracing::debug!("local store ready");
        Ok(SqliteStore { db })
    }
}

#[async_trait::async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = local_kv::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("Failed to read local key {}", key))?;
        Ok(row.map(|r| r.value))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let row = local_kv::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };
        local_kv::Entity::insert(row)
            .on_conflict(
                OnConflict::column(local_kv::Column::Key)
                    .update_columns([local_kv::Column::Value, local_kv::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .with_context(|| format!("Failed to write local key {}", key))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        local_kv::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await
            .with_context(|| format!("Failed to remove local key {}", key))?;
        Ok(())
    }
}
