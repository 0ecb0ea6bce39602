//! Sessions and the session executor.
//!
//! A [`Session`] is one live connection plus the per-connection state the engine tracks:
//! the session id assigned on first use and whether the session context table exists.
//! [`SessionExecutor::run`] leases a session, runs a [`UnitOfWork`] on it and gives the
//! session back, reconnecting and retrying when the transport fails before any statement
//! made progress.

use crate::config::DbConfig;
use crate::db::driver::DriverConnection;
use crate::db::pool::PoolManager;
use crate::db::transaction::Transaction;
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Retries after the first attempt when the transport fails on the first statement.
pub const MAX_NETWORK_RETRIES: u32 = 3;

pub struct Session {
    conn: Box<dyn DriverConnection>,
    config_id: String,
    id: Option<u64>,
    has_meta: bool,
}

impl Session {
    pub fn new(conn: Box<dyn DriverConnection>, config_id: &str) -> Self {
        Self {
            conn,
            config_id: config_id.to_string(),
            id: None,
            has_meta: false,
        }
    }

    /// Session id, assigned on first use.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    /// Assign the session id. Returns `false` if the session was already tagged.
    pub fn tag(&mut self, id: u64) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(id);
        true
    }

    pub fn has_meta(&self) -> bool {
        self.has_meta
    }

    pub fn set_has_meta(&mut self) {
        self.has_meta = true;
    }

    pub fn connection(&mut self) -> &mut dyn DriverConnection {
        self.conn.as_mut()
    }

    pub async fn close(self) -> DbResult<()> {
        self.conn.close().await
    }
}

/// Work run against one session.
///
/// `pre` holds the statements that must run before the work's own statements: the
/// pre-session SQL on a connection's first use, nothing otherwise.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Output: Send;

    async fn run(&self, session: &mut Session, pre: &[String]) -> DbResult<Self::Output>;
}

pub struct SessionExecutor {
    pools: Arc<PoolManager>,
}

impl SessionExecutor {
    pub fn new(pools: Arc<PoolManager>) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    /// Run `work` inside `tx`, or on a freshly leased session when there is no transaction.
    pub async fn run<W: UnitOfWork>(
        &self,
        tx: Option<&Transaction<'_>>,
        config: &DbConfig,
        work: &W,
    ) -> DbResult<W::Output> {
        if let Some(tx) = tx {
            if tx.config_id() != config.id {
                return Err(DbError::transaction(
                    "Transaction cannot span multiple database connections",
                ));
            }
            let mut session = tx.session().await;
            return work.run(&mut **session, &[]).await;
        }

        let mut retries = 0;
        loop {
            match self.run_once(config, work).await {
                Err(err) if err.is_network() => {
                    warn!(
                        connection_id = %config.id,
                        error = %err,
                        statement_index = err.statement_index().unwrap_or(0),
                        "Network error, closing all pools"
                    );
                    self.pools.close_all_after_network_failure().await;
                    if retries < MAX_NETWORK_RETRIES && err.statement_index().unwrap_or(0) == 0 {
                        retries += 1;
                        debug!(connection_id = %config.id, attempt = retries, "Retrying unit of work");
                        tokio::task::yield_now().await;
                        continue;
                    }
                    return Err(err);
                }
                result => return result,
            }
        }
    }

    async fn run_once<W: UnitOfWork>(&self, config: &DbConfig, work: &W) -> DbResult<W::Output> {
        if config.options.pooled_or_default() {
            let pool = self.pools.get_pool(config).await?;
            let start = Instant::now();
            let mut lease = pool.acquire().await?;
            trace!(
                connection_id = %config.id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Connection acquired"
            );
            let pre = self.prepare(lease.session_mut(), config);
            let result = work.run(lease.session_mut(), &pre).await;
            match &result {
                Err(err) if err.is_network() => pool.discard(lease).await,
                _ => pool.release(lease).await,
            }
            result
        } else {
            let mut session = self.pools.connect(config).await?;
            let pre = self.prepare(&mut session, config);
            let result = work.run(&mut session, &pre).await;
            if let Err(err) = session.close().await {
                debug!(connection_id = %config.id, error = %err, "Error closing connection");
            }
            result
        }
    }

    /// Tag a session on first use and return its pre-session statements.
    pub(crate) fn prepare(&self, session: &mut Session, config: &DbConfig) -> Vec<String> {
        if session.id().is_some() {
            return Vec::new();
        }
        let id = self.pools.next_session_id();
        session.tag(id);
        debug!(connection_id = %config.id, session_id = id, "New session");
        config.options.presql_statements()
    }
}
