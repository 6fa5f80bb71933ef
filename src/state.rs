use std::sync::Arc;

use time::UtcOffset;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::clock::{local_offset, Clock, SystemClock};
use crate::config::AppConfig;
use crate::store::{postgres, MemoryStore, TreeStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TreeStore>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let retries = config.meals.store_max_retries;

        let store = match config.database_url.as_deref() {
            Some(url) => {
                info!("using postgres tree store");
                Arc::new(postgres::connect(url, retries).await?) as Arc<dyn TreeStore>
            }
            None => {
                warn!("DATABASE_URL not set; state lives in memory and is lost on restart");
                Arc::new(MemoryStore::new(retries)) as Arc<dyn TreeStore>
            }
        };

        Ok(Self::from_parts(store, config, Arc::new(SystemClock)))
    }

    pub fn from_parts(store: Arc<dyn TreeStore>, config: Arc<AppConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Logs every path written through the store until it shuts down.
    pub fn spawn_change_log(&self) {
        let mut changes = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(path) => debug!(%path, "tree node written"),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "change log fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn local_offset(&self) -> UtcOffset {
        local_offset(self.config.meals.utc_offset_minutes)
    }

    /// In-memory state at +06:00, pinned to 2025-06-14 12:00 local time.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_at(time::macros::datetime!(2025-06-14 06:00 UTC))
    }

    #[cfg(test)]
    pub fn fake_at(now: time::OffsetDateTime) -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            meals: crate::config::MealConfig {
                utc_offset_minutes: 360,
                store_max_retries: 25,
                bootstrap_admin_email: Some("warden@hall.org".into()),
            },
        });
        Self::from_parts(
            Arc::new(MemoryStore::new(25)),
            config,
            Arc::new(crate::clock::FixedClock(now)),
        )
    }
}
