//! PostgreSQL connection and schema management

pub mod migrations;
mod postgres;

pub use migrations::{run_migrations, Migration, PostgresMigrator};
pub use postgres::PostgresConfig;
