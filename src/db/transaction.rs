//! Transaction handles.

use crate::db::session::Session;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// A transaction bound to one session for its whole begin/commit-or-rollback span.
///
/// Work executed with the handle runs on the bound session; work for a different
/// configuration is refused.
pub struct Transaction<'s> {
    id: Uuid,
    config_id: String,
    session: Mutex<&'s mut Session>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_id: session.config_id().to_string(),
            session: Mutex::new(session),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    /// Exclusive access to the bound session.
    pub(crate) async fn session(&self) -> MutexGuard<'_, &'s mut Session> {
        self.session.lock().await
    }
}
