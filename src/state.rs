use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::google::{GoogleClient, IdentityProvider};
use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.database_url.as_deref() {
            Some(url) => {
                let pg = PgStore::connect(url, config.db_max_connections).await?;
                if let Err(e) = pg.migrate().await {
                    warn!(error = %e, "migration failed; continuing");
                }
                info!("connected to postgres");
                Arc::new(pg) as Arc<dyn Store>
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data will not persist");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        let identity = Arc::new(GoogleClient::new(&config.google)) as Arc<dyn IdentityProvider>;

        Ok(Self::from_parts(store, config, identity))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let jwt = JwtKeys::from_config(&config.jwt);
        Self {
            store,
            config,
            jwt,
            identity,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::auth::google::FakeIdentity;
        use crate::config::{GoogleConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            db_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                ttl_minutes: 5,
            },
            google: GoogleConfig {
                client_id: None,
                redirect_url: None,
            },
        });
        Self::from_parts(Arc::new(MemoryStore::new()), config, Arc::new(FakeIdentity))
    }
}
