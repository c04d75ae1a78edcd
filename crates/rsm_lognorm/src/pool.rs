//! Session pooling for parallel normalization.
//!
//! A context must never be used from two threads at once, so parallel
//! callers each take their own `NormalizationSession` from the pool and
//! hand it back when done.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::LognormError;
use crate::factory::LognormFactory;
use crate::loader::LoadState;
use crate::session::NormalizationSession;

/// Thread-safe pool of sessions built from one factory.
///
/// Sessions are built lazily on demand and returned to the pool when the
/// `PooledSession` guard drops. Closed sessions and sessions whose last load
/// failed are discarded instead.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use rsm_lognorm::{LognormFactory, SessionPool};
///
/// let pool = Arc::new(SessionPool::new(LognormFactory::from_file("syslog.rulebase")));
///
/// // In parallel threads:
/// let mut session = pool.acquire()?;
/// let json = session.normalize(line)?;
/// // session is returned to pool when dropped
/// ```
pub struct SessionPool {
    factory: LognormFactory,
    available: Mutex<VecDeque<NormalizationSession>>,
}

impl SessionPool {
    /// Creates an empty pool.
    pub fn new(factory: LognormFactory) -> Self {
        Self {
            factory,
            available: Mutex::new(VecDeque::new()),
        }
    }

    /// Takes an idle session, or builds a new one if none is available.
    pub fn acquire(&self) -> Result<PooledSession<'_>, LognormError> {
        let existing = self.available.lock().pop_front();
        let session = match existing {
            Some(session) => session,
            None => {
                debug!("Session pool empty, building a new session");
                self.factory.build()?
            }
        };
        Ok(PooledSession {
            session: Some(session),
            pool: &self.available,
        })
    }

    /// Returns the number of idle sessions.
    pub fn available_count(&self) -> usize {
        self.available.lock().len()
    }

    /// Releases every idle session.
    pub fn clear(&self) {
        self.available.lock().clear();
    }

    pub fn factory(&self) -> &LognormFactory {
        &self.factory
    }
}

/// A RAII guard that returns the session to the pool on drop.
pub struct PooledSession<'a> {
    session: Option<NormalizationSession>,
    pool: &'a Mutex<VecDeque<NormalizationSession>>,
}

impl std::ops::Deref for PooledSession<'_> {
    type Target = NormalizationSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref().expect("session was already taken")
    }
}

impl std::ops::DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut().expect("session was already taken")
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.is_open() && session.load_state() == LoadState::Loaded {
                self.pool.lock().push_back(session);
            } else {
                debug!("Discarding unusable session");
            }
        }
    }
}
