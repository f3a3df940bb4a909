use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use std::path::Path;

use crate::error::Result;

pub mod aggr_view;
pub mod event;
pub mod mute;
pub mod notification;
pub mod rule;
pub mod statistics;
pub mod subscribe;
pub mod target;

pub use aggr_view::AggrViewRow;
pub use event::{
    CurrentEventFilter, EventRow, Expected, HistoryEventFilter, PersistOutcome, TimeRange,
    Transition,
};
pub use mute::{MuteRow, MuteTimeType, PeriodicMute, PeriodicWindow};
pub use notification::NotificationRecordFilter;
pub use statistics::EventStatistics;
pub use subscribe::SubscribeRow;
pub use target::BusiGroupRow;

/// Unified access layer for the alert database.
///
/// Every method is an `async fn` over SeaORM. The event tables are only
/// written through [`Store::persist`].
pub struct Store {
    pub(crate) db: DatabaseConnection,
}

impl Store {
    /// Connects and migrates the database.
    ///
    /// SQLite example: `sqlite:///data/n9e.db?mode=rwc`.
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL only applies to SQLite
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!(db_url = %db_url, "Initialized alert store");
        Ok(Self { db })
    }

    /// Opens (creating if needed) a SQLite database file.
    pub async fn open_sqlite(path: &Path) -> Result<Self> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        Self::new(&url).await
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
