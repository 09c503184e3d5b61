//! Models and types related to the database.

use std::fmt::Debug;
use std::path::Path;

use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::{Connection as DieselConnection, SqliteConnection};

use diesel_migrations::{
    embed_migrations, EmbeddedMigrations, MigrationHarness,
};

use crate::{Error, Result};

pub mod post;
pub use post::*;

pub mod report;
pub use report::*;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// A post number.
pub type PostId = i64;
/// A report number.
pub type ReportId = i64;

pub(crate) type Connection =
    PooledConnection<ConnectionManager<SqliteConnection>>;

/// A connection to the database. Used for creating and retrieving data.
pub struct Database {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Debug for Database {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = self.pool.state();

        write!(
            fmt,
            "<#Database connections={} idle_connections={}>",
            state.connections, state.idle_connections,
        )?;

        Ok(())
    }
}

impl Database {
    /// Open a database at the given path, creating the schema if needed.
    pub fn open<P>(path: P) -> Result<Database>
    where
        P: AsRef<Path>,
    {
        let url = path.as_ref().to_string_lossy().into_owned();

        let mut conn = SqliteConnection::establish(&url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| Error::Migration {
                message: err.to_string(),
            })?;
        drop(conn);

        let pool = Pool::builder().build(ConnectionManager::new(&url))?;

        Ok(Database { pool })
    }

    pub(crate) fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get()?)
    }
}
