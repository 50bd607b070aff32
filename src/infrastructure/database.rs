//! Pooled SQLite connection and the in-process change feed

use crate::infrastructure::entities::ChangeEvent;
use di::inject;
use di::injectable;
use log::debug;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;
use std::ops::{Deref, DerefMut};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

static TEST_POOL: RwLock<Option<SqlitePool>> = RwLock::new(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create() -> DatabaseConnection {
        if let Some(pool) = TEST_POOL
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return DatabaseConnection { connection: pool };
        }

        dotenvy::dotenv().ok();
        let connection_string = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_lazy(&connection_string)
            .expect("Cannot connect to database");

        DatabaseConnection { connection: pool }
    }
}

impl DatabaseConnection {
    pub fn from_pool(pool: SqlitePool) -> DatabaseConnection {
        DatabaseConnection { connection: pool }
    }

    /// Makes every DI-created connection use `pool` until [`Self::clear_test_pool`].
    pub fn set_test_pool(pool: SqlitePool) {
        *TEST_POOL.write().unwrap_or_else(PoisonError::into_inner) = Some(pool);
    }

    pub fn clear_test_pool() {
        *TEST_POOL.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.connection).await
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for DatabaseConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

/// Fan-out of write notifications to every open watch.
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

#[injectable]
impl ChangeFeed {
    #[inject]
    pub fn create() -> ChangeFeed {
        let (sender, _) = broadcast::channel(256);
        ChangeFeed { sender }
    }
}

impl ChangeFeed {
    pub fn publish(&self, event: ChangeEvent) {
        // no watchers is fine
        if self.sender.send(event).is_err() {
            debug!("no watchers for {event:?}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
