use super::{Collection, DocumentStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, QueryFilter, Schema, Set,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Single table holding every collection, keyed by `(collection, id)`.
pub mod document {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "documents")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub collection: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        #[sea_orm(column_type = "Text")]
        pub body: String,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// sea-orm backed document store (SQLite or Postgres).
#[derive(Debug, Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    /// Connects and makes sure the `documents` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        // each connection to an in-memory SQLite database sees its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };
        let mut opt = ConnectOptions::new(database_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(30))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        let store = Self { db };
        store.ensure_schema().await?;
        info!("Document store connected");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut statement = schema.create_table_from_entity(document::Entity);
        statement.if_not_exists();
        self.db.execute(backend.build(&statement)).await?;
        debug!("documents table ready");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqlStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let row = document::Entity::find_by_id((collection.to_string(), id.to_string()))
            .one(&self.db)
            .await?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.body)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        let model = document::ActiveModel {
            collection: Set(collection.to_string()),
            id: Set(id.to_string()),
            body: Set(serde_json::to_string(&document)?),
            updated_at: Set(Utc::now()),
        };

        document::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([document::Column::Collection, document::Column::Id])
                    .update_columns([document::Column::Body, document::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let result = document::Entity::delete_by_id((collection.to_string(), id.to_string()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let rows = document::Entity::find()
            .filter(document::Column::Collection.eq(collection.to_string()))
            .all(&self.db)
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_str(&row.body).map_err(StoreError::from))
            .collect()
    }
}
