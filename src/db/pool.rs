//! Connection pool management.
//!
//! One [`PoolEntry`] exists per configuration identity. The first caller to need a pool
//! starts its establishment in a background task; everyone who asks while it is in flight
//! queues a waiter and receives the same outcome. A failed establishment leaves the entry
//! empty so the next caller starts over. Every successful lookup re-arms the entry's idle
//! timer, and a pool nobody asks for during the idle period is closed.

use crate::config::DbConfig;
use crate::db::driver::Driver;
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A bounded set of connections for one configuration.
pub struct ConnectionPool {
    config: DbConfig,
    driver: Arc<dyn Driver>,
    idle: Mutex<Vec<Session>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

/// A connection checked out of a pool. Hand it back with [`ConnectionPool::release`] or
/// [`ConnectionPool::discard`].
pub struct Lease {
    session: Session,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl ConnectionPool {
    /// Open a pool with its initial connections.
    async fn open(config: DbConfig, driver: Arc<dyn Driver>) -> DbResult<Arc<Self>> {
        let start = Instant::now();
        let initial = config.options.initial_size_or_default() as usize;
        let max = config.options.max_size_or_default() as usize;

        let mut sessions = Vec::with_capacity(initial);
        for _ in 0..initial {
            match driver.connect(&config).await {
                Ok(conn) => sessions.push(Session::new(conn, &config.id)),
                Err(err) => {
                    for session in sessions {
                        let _ = session.close().await;
                    }
                    return Err(err);
                }
            }
        }

        trace!(
            connection_id = %config.id,
            connections = initial,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pool established"
        );
        Ok(Arc::new(Self {
            config,
            driver,
            idle: Mutex::new(sessions),
            permits: Arc::new(Semaphore::new(max)),
            closed: AtomicBool::new(false),
        }))
    }

    /// Check out an idle connection, opening a new one if none is idle.
    ///
    /// Waits while `max_size` connections are leased.
    pub async fn acquire(&self) -> DbResult<Lease> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbError::connection("Connection pool is closed"))?;
        let idle = lock(&self.idle).pop();
        let session = match idle {
            Some(session) => session,
            None => Session::new(self.driver.connect(&self.config).await?, &self.config.id),
        };
        Ok(Lease {
            session,
            _permit: permit,
        })
    }

    /// Return a connection for reuse. Connections returned to a closed pool are closed.
    pub async fn release(&self, lease: Lease) {
        if self.closed.load(Ordering::Acquire) {
            let _ = lease.session.close().await;
            return;
        }
        lock(&self.idle).push(lease.session);
    }

    /// Close a connection that must not be reused.
    pub async fn discard(&self, lease: Lease) {
        if let Err(err) = lease.session.close().await {
            debug!(connection_id = %self.config.id, error = %err, "Error closing discarded connection");
        }
    }

    pub async fn close(&self) {
        let start = Instant::now();
        self.closed.store(true, Ordering::Release);
        self.permits.close();
        let sessions: Vec<Session> = lock(&self.idle).drain(..).collect();
        for session in sessions {
            if let Err(err) = session.close().await {
                debug!(connection_id = %self.config.id, error = %err, "Error closing pooled connection");
            }
        }
        trace!(
            connection_id = %self.config.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        lock(&self.idle).len()
    }
}

type Waiter = oneshot::Sender<DbResult<Arc<ConnectionPool>>>;

#[derive(Default)]
struct EntryState {
    pool: Option<Arc<ConnectionPool>>,
    /// `Some` while an establishment is in flight.
    pending: Option<Vec<Waiter>>,
    idle_timer: Option<JoinHandle<()>>,
    /// Bumped on every close so stale establishments and timers can tell they lost.
    generation: u64,
    /// Bumped on every re-arm. A timer that already woke cannot be aborted, so it checks this.
    timer_epoch: u64,
}

#[derive(Default)]
struct PoolEntry {
    state: Mutex<EntryState>,
}

impl PoolEntry {
    fn arm_idle_timer(self: &Arc<Self>, state: &mut EntryState, idle: Option<Duration>, id: &str) {
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        state.timer_epoch += 1;
        let Some(idle) = idle else {
            return;
        };
        let entry = Arc::clone(self);
        let (generation, epoch) = (state.generation, state.timer_epoch);
        let id = id.to_string();
        state.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let pool = {
                let mut state = lock(&entry.state);
                if state.generation != generation || state.timer_epoch != epoch {
                    return;
                }
                state.idle_timer = None;
                state.generation += 1;
                state.pool.take()
            };
            if let Some(pool) = pool {
                info!(connection_id = %id, idle_ms = idle.as_millis() as u64, "Closing idle pool");
                pool.close().await;
            }
        }));
    }

    /// Empty the entry, failing queued waiters with `error`. Returns the pool to close.
    fn reset(&self, error: &DbError) -> Option<Arc<ConnectionPool>> {
        let mut state = lock(&self.state);
        state.generation += 1;
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        for waiter in state.pending.take().unwrap_or_default() {
            let _ = waiter.send(Err(error.clone()));
        }
        state.pool.take()
    }
}

/// Owns every pool, keyed by configuration identity, and hands out session ids.
pub struct PoolManager {
    driver: Arc<dyn Driver>,
    entries: Mutex<HashMap<String, Arc<PoolEntry>>>,
    next_session_id: AtomicU64,
}

impl PoolManager {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            entries: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(0),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Next session id; ids start at 1 and are never reused.
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Open an unpooled connection.
    pub async fn connect(&self, config: &DbConfig) -> DbResult<Session> {
        let start = Instant::now();
        let conn = self.driver.connect(config).await?;
        trace!(
            connection_id = %config.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Unpooled connection opened"
        );
        Ok(Session::new(conn, &config.id))
    }

    fn entry(&self, id: &str) -> Arc<PoolEntry> {
        Arc::clone(lock(&self.entries).entry(id.to_string()).or_default())
    }

    /// The pool for `config`, establishing it if needed.
    pub async fn get_pool(&self, config: &DbConfig) -> DbResult<Arc<ConnectionPool>> {
        let entry = self.entry(&config.id);
        let idle = config.options.idle_disconnect_or_default().duration();

        let receiver = {
            let mut state = lock(&entry.state);
            if let Some(pool) = state.pool.clone() {
                entry.arm_idle_timer(&mut state, idle, &config.id);
                return Ok(pool);
            }
            let (sender, receiver) = oneshot::channel();
            match state.pending.as_mut() {
                Some(waiters) => waiters.push(sender),
                None => {
                    state.pending = Some(vec![sender]);
                    self.spawn_establish(Arc::clone(&entry), state.generation, config.clone());
                }
            }
            receiver
        };

        receiver
            .await
            .map_err(|_| DbError::connection("Pool establishment was abandoned"))?
    }

    fn spawn_establish(&self, entry: Arc<PoolEntry>, generation: u64, config: DbConfig) {
        let driver = Arc::clone(&self.driver);
        info!(connection_id = %config.id, "Establishing connection pool");
        tokio::spawn(async move {
            let idle = config.options.idle_disconnect_or_default().duration();
            let id = config.id.clone();
            let result = ConnectionPool::open(config, driver).await;

            let (waiters, stale) = {
                let mut state = lock(&entry.state);
                if state.generation != generation {
                    (Vec::new(), result.as_ref().ok().cloned())
                } else {
                    let waiters = state.pending.take().unwrap_or_default();
                    match &result {
                        Ok(pool) => {
                            state.pool = Some(Arc::clone(pool));
                            entry.arm_idle_timer(&mut state, idle, &id);
                        }
                        Err(err) => {
                            warn!(connection_id = %id, error = %err, "Pool establishment failed");
                        }
                    }
                    (waiters, None)
                }
            };

            if let Some(pool) = stale {
                pool.close().await;
            }
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        });
    }

    /// Close one configuration's pool, if any.
    pub async fn close(&self, id: &str) {
        let entry = lock(&self.entries).get(id).cloned();
        let error = DbError::connection("Connection pool was closed");
        if let Some(pool) = entry.and_then(|e| e.reset(&error)) {
            pool.close().await;
        }
    }

    /// Close every pool and cancel pending establishments and idle timers.
    pub async fn close_all(&self) {
        self.close_all_with(DbError::connection("Connection pools were closed"))
            .await;
    }

    /// Close every pool after a transport failure.
    ///
    /// Callers waiting on an establishment get a network error, so their own units of work
    /// go through the bounded retry instead of failing outright.
    pub async fn close_all_after_network_failure(&self) {
        self.close_all_with(DbError::network("Connection pools were closed after a network failure"))
            .await;
    }

    async fn close_all_with(&self, error: DbError) {
        let entries: Vec<(String, Arc<PoolEntry>)> = lock(&self.entries)
            .iter()
            .map(|(id, e)| (id.clone(), Arc::clone(e)))
            .collect();
        for (id, entry) in entries {
            if let Some(pool) = entry.reset(&error) {
                info!(connection_id = %id, "Closing connection pool");
                pool.close().await;
            }
        }
    }

    /// Whether a live pool exists for `id`.
    pub fn has_pool(&self, id: &str) -> bool {
        lock(&self.entries)
            .get(id)
            .is_some_and(|e| lock(&e.state).pool.is_some())
    }
}
