//! # cinelog-db
//!
//! PostgreSQL database layer for cinelog.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for sources, videos, jobs, and duplicates
//! - Schema migrations (behind the `migrations` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use cinelog_db::Database;
//! use cinelog_core::{JobType, SourceRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cinelog").await?;
//!     let source = db.sources.create("id:abc123", "/Footage/Day1").await?;
//!     println!("Watching {}", source.path);
//!     Ok(())
//! }
//! ```

pub mod duplicates;
pub mod jobs;
pub mod pool;
pub mod sources;
pub mod videos;

// Re-export core types
pub use cinelog_core::*;

pub use duplicates::PgDuplicateRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use sources::PgSourceRepository;
pub use videos::PgVideoRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Watched-folder repository.
    pub sources: PgSourceRepository,
    /// Video catalog repository.
    pub videos: PgVideoRepository,
    /// Job queue repository.
    pub jobs: PgJobRepository,
    /// Duplicate-link repository.
    pub duplicates: PgDuplicateRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            sources: PgSourceRepository::new(pool.clone()),
            videos: PgVideoRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            duplicates: PgDuplicateRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to the given URL, sizing the pool from the environment.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url, &PoolConfig::from_env()).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
