use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::repo::User;
use crate::markers::repo::{Marker, MarkerPatch};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Document-store access capability.
///
/// One implementation talks to MongoDB, one keeps everything in memory
/// for tests. Handlers receive it as `Arc<dyn Store>` through
/// `AppState`; all shared state lives behind this seam.
///
/// Every operation touches a single document; there are no multi-record
/// transactions and no retries, so a failed call surfaces directly.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> anyhow::Result<()>;

    async fn insert_marker(&self, marker: &Marker) -> anyhow::Result<()>;
    /// List markers in store-natural order, optionally restricted to an
    /// exact category match, never more than `limit` records.
    async fn list_markers(&self, category: Option<&str>, limit: i64)
        -> anyhow::Result<Vec<Marker>>;
    async fn find_marker(&self, id: Uuid) -> anyhow::Result<Option<Marker>>;
    /// Overwrite exactly the fields present in `patch`.
    async fn update_marker(&self, id: Uuid, patch: &MarkerPatch) -> anyhow::Result<()>;
    async fn delete_marker(&self, id: Uuid) -> anyhow::Result<()>;
}
