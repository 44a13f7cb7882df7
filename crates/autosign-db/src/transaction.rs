use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres};

use autosign_core::error::Result;
use autosign_core::traits::StoreTx;

use crate::db_err;

/// An open Postgres transaction. Dropped without commit, it rolls back.
pub struct PgTx(sqlx::Transaction<'static, Postgres>);

impl PgTx {
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        Ok(Self(pool.begin().await.map_err(db_err)?))
    }

    pub(crate) fn conn(&mut self) -> &mut PgConnection {
        &mut self.0
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> Result<()> {
        self.0.commit().await.map_err(db_err)
    }

    async fn rollback(self) -> Result<()> {
        self.0.rollback().await.map_err(db_err)
    }
}
