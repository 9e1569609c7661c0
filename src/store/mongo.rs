use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::info;
use uuid::Uuid;

use super::Store;
use crate::auth::repo::User;
use crate::config::AppConfig;
use crate::markers::repo::{Marker, MarkerPatch};

/// MongoDB-backed store over the `users` and `markers` collections.
///
/// Ids and timestamps land in the documents as strings (uuid and
/// RFC 3339 respectively); Mongo's own `_id` stays out of the public
/// schema and list reads project it away.
pub struct MongoStore {
    users: Collection<User>,
    markers: Collection<Marker>,
}

impl MongoStore {
    /// Connect and prepare collections. Server selection is bounded so
    /// a dead database turns into an error instead of a hung request.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&config.mongo_url)
            .await
            .context("parse MONGO_URL")?;
        options.server_selection_timeout = Some(Duration::from_secs(5));

        let client = Client::with_options(options).context("build mongo client")?;
        let db = client.database(&config.db_name);
        let store = Self {
            users: db.collection("users"),
            markers: db.collection("markers"),
        };
        store.ensure_indexes().await?;

        info!(db = %config.db_name, "connected to document store");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let email_unique = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users
            .create_index(email_unique)
            .await
            .context("create unique email index")?;
        Ok(())
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.users
            .find_one(doc! { "email": email })
            .await
            .context("find user by email")
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.users
            .find_one(doc! { "id": id.to_string() })
            .await
            .context("find user by id")
    }

    async fn insert_user(&self, user: &User) -> anyhow::Result<()> {
        self.users.insert_one(user).await.context("insert user")?;
        Ok(())
    }

    async fn insert_marker(&self, marker: &Marker) -> anyhow::Result<()> {
        self.markers
            .insert_one(marker)
            .await
            .context("insert marker")?;
        Ok(())
    }

    async fn list_markers(
        &self,
        category: Option<&str>,
        limit: i64,
    ) -> anyhow::Result<Vec<Marker>> {
        let filter = match category {
            Some(category) => doc! { "category": category },
            None => doc! {},
        };
        let mut cursor = self
            .markers
            .find(filter)
            .projection(doc! { "_id": 0 })
            .limit(limit)
            .await
            .context("list markers")?;

        let mut markers = Vec::new();
        while let Some(marker) = cursor.try_next().await.context("read marker cursor")? {
            markers.push(marker);
        }
        Ok(markers)
    }

    async fn find_marker(&self, id: Uuid) -> anyhow::Result<Option<Marker>> {
        self.markers
            .find_one(doc! { "id": id.to_string() })
            .projection(doc! { "_id": 0 })
            .await
            .context("find marker")
    }

    async fn update_marker(&self, id: Uuid, patch: &MarkerPatch) -> anyhow::Result<()> {
        let set = mongodb::bson::to_document(patch).context("encode marker patch")?;
        self.markers
            .update_one(doc! { "id": id.to_string() }, doc! { "$set": set })
            .await
            .context("update marker")?;
        Ok(())
    }

    async fn delete_marker(&self, id: Uuid) -> anyhow::Result<()> {
        self.markers
            .delete_one(doc! { "id": id.to_string() })
            .await
            .context("delete marker")?;
        Ok(())
    }
}
