//! Schema migrations.

use std::path::Path;

use sqlx::PgPool;
use sqlx::migrate::Migrator;

use autosign_core::error::{AutosignError, Result};

/// A loaded migration set, applied with [`MigrationRunner::run`].
pub struct MigrationRunner {
    migrator: Migrator,
}

impl MigrationRunner {
    /// Migrations compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            migrator: sqlx::migrate!("./migrations"),
        }
    }

    /// Migrations read from `dir` at runtime.
    pub async fn from_dir(dir: &Path) -> Result<Self> {
        let migrator = Migrator::new(dir)
            .await
            .map_err(|e| AutosignError::Database(format!("load migrations from {}: {e}", dir.display())))?;
        Ok(Self { migrator })
    }

    /// `(version, description)` in apply order.
    pub fn versions(&self) -> Vec<(i64, String)> {
        self.migrator
            .iter()
            .map(|m| (m.version, m.description.to_string()))
            .collect()
    }

    pub async fn run(&self, pool: &PgPool) -> Result<()> {
        self.migrator
            .run(pool)
            .await
            .map_err(|e| AutosignError::Database(format!("migrate: {e}")))?;
        tracing::info!("✅ Schema up to date ({} migrations)", self.migrator.iter().count());
        Ok(())
    }
}
