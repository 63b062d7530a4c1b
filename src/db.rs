//! Process-wide database pool.

use once_cell::sync::OnceCell;
use sea_orm::{Database, DatabaseConnection, DbErr};

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

/// Connect and install the global pool. A second call is a no-op so tests
/// and embedders can share one process.
pub async fn init_db(url: &str) -> Result<(), DbErr> {
    if DB_POOL.get().is_some() {
        log::warn!("database pool already initialized, ignoring init_db");
        return Ok(());
    }
    let pool = Database::connect(url).await?;
    let _ = DB_POOL.set(pool);
    Ok(())
}

/// Panics when called before [`init_db`]; pool setup is a startup invariant.
pub fn get_db_pool() -> &'static DatabaseConnection {
    DB_POOL
        .get()
        .expect("Database pool not initialized. Call init_db first.")
}
