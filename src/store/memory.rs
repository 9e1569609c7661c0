use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::auth::repo::User;
use crate::markers::repo::{Marker, MarkerPatch};

/// In-memory store double for tests and `AppState::fake()`.
///
/// Insertion order stands in for the database's natural order; the
/// duplicate-email check stands in for the unique index.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
    markers: RwLock<Vec<Marker>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&self, user: &User) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        anyhow::ensure!(
            users.iter().all(|u| u.email != user.email),
            "duplicate key: email {}",
            user.email
        );
        users.push(user.clone());
        Ok(())
    }

    async fn insert_marker(&self, marker: &Marker) -> anyhow::Result<()> {
        self.markers.write().await.push(marker.clone());
        Ok(())
    }

    async fn list_markers(
        &self,
        category: Option<&str>,
        limit: i64,
    ) -> anyhow::Result<Vec<Marker>> {
        Ok(self
            .markers
            .read()
            .await
            .iter()
            .filter(|m| category.map_or(true, |c| m.category.as_str() == c))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_marker(&self, id: Uuid) -> anyhow::Result<Option<Marker>> {
        Ok(self
            .markers
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn update_marker(&self, id: Uuid, patch: &MarkerPatch) -> anyhow::Result<()> {
        let mut markers = self.markers.write().await;
        if let Some(marker) = markers.iter_mut().find(|m| m.id == id) {
            if let Some(title) = &patch.title {
                marker.title = title.clone();
            }
            if let Some(category) = patch.category {
                marker.category = category;
            }
            if let Some(description) = &patch.description {
                marker.description = description.clone();
            }
            if let Some(latitude) = patch.latitude {
                marker.latitude = latitude;
            }
            if let Some(longitude) = patch.longitude {
                marker.longitude = longitude;
            }
            if let Some(image) = &patch.image {
                marker.image = image.clone();
            }
            marker.updated_at = patch.updated_at;
        }
        Ok(())
    }

    async fn delete_marker(&self, id: Uuid) -> anyhow::Result<()> {
        self.markers.write().await.retain(|m| m.id != id);
        Ok(())
    }
}
