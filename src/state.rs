use crate::config::AppConfig;
use crate::leaderboard::Leaderboard;
use crate::notify::{LogNotifier, Notifier};
use crate::store::{MemoryStore, PgStore, TimerStore, UserStore};
use crate::timer::TimerEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub timers: TimerEngine,
    pub leaderboard: Leaderboard,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Connects to Postgres, runs migrations and wires the collaborators.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = Arc::new(
            PgStore::connect(
                &config.database_url,
                config.max_connections,
                config.store_timeout(),
            )
            .await?,
        );
        store.migrate().await?;

        Ok(Self::from_parts(
            config,
            store.clone(),
            store,
            Arc::new(LogNotifier),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        timer_store: Arc<dyn TimerStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            users,
            timers: TimerEngine::new(timer_store.clone()),
            leaderboard: Leaderboard::new(timer_store),
            notifier,
        }
    }

    /// State backed by a fresh in-memory store.
    pub fn in_memory(config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::from_parts(Arc::new(config), store.clone(), store, notifier)
    }
}
