use std::sync::Arc;

use crate::config::{AppConfig, JwtConfig};
use crate::store::{MemoryStore, MongoStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = Arc::new(MongoStore::connect(&config).await?) as Arc<dyn Store>;
        Ok(Self { store, config })
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// State for tests: in-memory store, fixed config, no environment.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            mongo_url: "mongodb://localhost:27017".into(),
            db_name: "waymark-test".into(),
            cors_origins: vec!["*".into()],
            jwt: JwtConfig {
                secret: "test-secret".into(),
                ttl_hours: 1,
            },
        });
        Self {
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }
}
