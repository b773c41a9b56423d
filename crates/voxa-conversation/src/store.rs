//! In-memory session store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use voxa_types::{Role, Turn};

/// Tuning for [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Maximum turns retained per session; oldest turns are dropped first.
    /// `0` disables the cap.
    pub max_stored_turns: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_stored_turns: 500,
        }
    }
}

/// Exclusive right to run the pipeline for one session.
///
/// Permits are granted in request arrival order. Dropping the permit lets
/// the next waiter in.
#[derive(Debug)]
pub struct SessionPermit {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl SessionPermit {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Keyed, ordered turn history.
///
/// Implementations must be safe to share across request tasks. Turn reads
/// and writes are brief and never span an `.await`; only [`acquire`]
/// waits.
///
/// [`acquire`]: ConversationStore::acquire
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends a turn, creating the session if the key is unseen.
    fn append_turn(&self, key: &str, role: Role, text: &str);

    /// Returns at most `max_turns` most recent turns in original order,
    /// creating the session if the key is unseen.
    fn window(&self, key: &str, max_turns: usize) -> Vec<Turn>;

    /// Returns the full retained history. Unseen keys yield an empty list
    /// and are not created.
    fn all(&self, key: &str) -> Vec<Turn>;

    /// Number of retained turns for `key` (0 for unseen keys).
    fn len(&self, key: &str) -> usize;

    /// Waits for exclusive access to `key`.
    async fn acquire(&self, key: &str) -> SessionPermit;

    /// Drops sessions idle for longer than `ttl` that nobody holds or waits
    /// on. Returns the number of evicted sessions.
    fn evict_idle(&self, ttl: Duration) -> usize;

    /// Number of live sessions.
    fn session_count(&self) -> usize;
}

#[derive(Debug)]
struct Session {
    turns: RwLock<Vec<Turn>>,
    gate: Arc<tokio::sync::Mutex<()>>,
    last_active: Mutex<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            turns: RwLock::new(Vec::new()),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        let mut last = self
            .last_active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last = self
            .last_active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        now.saturating_duration_since(*last)
    }

    fn is_claimed(&self) -> bool {
        Arc::strong_count(&self.gate) > 1
    }
}

/// Process-lifetime [`ConversationStore`] backed by a `HashMap`.
///
/// Uses `std::sync::RwLock` intentionally: every acquisition is a brief map
/// or vector operation that never spans an `.await` point.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    settings: StoreSettings,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!("conversation store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!("conversation store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

impl InMemoryStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            settings,
        }
    }

    fn get(&self, key: &str) -> Option<Arc<Session>> {
        read(&self.sessions).get(key).cloned()
    }

    fn get_or_create(&self, key: &str) -> Arc<Session> {
        if let Some(session) = self.get(key) {
            return session;
        }
        let mut sessions = write(&self.sessions);
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = key, "created conversation session");
                Arc::new(Session::new())
            })
            .clone()
    }

    /// Clones the session gate while a map lock is held, so eviction (which
    /// needs the write lock) observes the session as claimed.
    fn claim_gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        {
            let sessions = read(&self.sessions);
            if let Some(session) = sessions.get(key) {
                session.touch();
                return session.gate.clone();
            }
        }
        let mut sessions = write(&self.sessions);
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Session::new()));
        session.touch();
        session.gate.clone()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn append_turn(&self, key: &str, role: Role, text: &str) {
        let session = self.get_or_create(key);
        {
            let mut turns = write(&session.turns);
            turns.push(Turn::new(role, text));

            let cap = self.settings.max_stored_turns;
            if cap > 0 && turns.len() > cap {
                let excess = turns.len() - cap;
                turns.drain(..excess);
                tracing::debug!(session = key, dropped = excess, "trimmed stored history");
            }
        }
        session.touch();
    }

    fn window(&self, key: &str, max_turns: usize) -> Vec<Turn> {
        let session = self.get_or_create(key);
        session.touch();
        let turns = read(&session.turns);
        let start = turns.len().saturating_sub(max_turns);
        turns[start..].to_vec()
    }

    fn all(&self, key: &str) -> Vec<Turn> {
        match self.get(key) {
            Some(session) => read(&session.turns).clone(),
            None => Vec::new(),
        }
    }

    fn len(&self, key: &str) -> usize {
        self.get(key)
            .map(|session| read(&session.turns).len())
            .unwrap_or(0)
    }

    async fn acquire(&self, key: &str) -> SessionPermit {
        let gate = self.claim_gate(key);
        let guard = gate.lock_owned().await;
        SessionPermit {
            key: key.to_string(),
            _guard: guard,
        }
    }

    fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = write(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| session.is_claimed() || session.idle_for(now) <= ttl);
        before - sessions.len()
    }

    fn session_count(&self) -> usize {
        read(&self.sessions).len()
    }
}
