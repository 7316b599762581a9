use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

pub mod alert;
pub mod contact;
pub mod delivery;
pub mod policy;

pub use alert::{AlertFilter, AlertRow};
pub use contact::ContactRow;
pub use delivery::AttemptFilter;
pub use policy::{PolicyRow, StepRow};

/// Unified access layer for the alerting database.
///
/// All methods are `async fn` over SeaORM + SQLite. The connection is
/// cheap to clone via `Arc<Store>`; it is shared by the HTTP handlers,
/// the escalation engine, and the ledger service.
pub struct Store {
    pub(crate) db: DatabaseConnection,
}

impl Store {
    /// Connects and initializes the database.
    ///
    /// `db_url` is a full connection URL, e.g.
    /// `sqlite:///data/seawarn.db?mode=rwc`. Pending
    /// `sea-orm-migration` migrations run automatically.
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL mode only applies to SQLite.
        if db_url.starts_with("sqlite://") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!(db_url = %db_url, "Initialized alert store");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
