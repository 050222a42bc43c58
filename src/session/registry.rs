use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::RwLock, time::Instant};
use uuid::Uuid;

use super::{
    auth::AuthSession,
    storage::{FileStorage, MemoryStorage, SessionStorage},
};
use crate::search::{suggest::SuggestionEngine, SearchView};

// Idle visitors are looked for at most this often
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One browser: its session, autocomplete state and search results.
pub struct Visitor {
    pub id: String,
    pub auth: AuthSession,
    pub suggestions: SuggestionEngine,
    pub search: SearchView,
    last_seen: Mutex<Instant>,
}

impl Visitor {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Visitors keyed by the id stored in their cookie.
///
/// Visitors idle for longer than `idle_ttl` are dropped when the next new
/// visitor arrives. With a `session_dir` their session comes back from disk
/// on their next request; in-memory sessions are gone.
pub struct VisitorRegistry {
    visitors: RwLock<HashMap<String, Arc<Visitor>>>,
    session_dir: Option<PathBuf>,
    debounce: Duration,
    idle_ttl: Duration,
    last_sweep: Mutex<Instant>,
}

impl VisitorRegistry {
    pub fn new(session_dir: Option<PathBuf>, debounce: Duration, idle_ttl: Duration) -> Self {
        Self {
            visitors: RwLock::new(HashMap::new()),
            session_dir,
            debounce,
            idle_ttl,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Looks the visitor up by cookie id, creating one for missing or malformed ids.
    /// The flag is true when a new visitor (and so a new cookie) was made.
    pub async fn get_or_create(&self, id: Option<&str>) -> (Arc<Visitor>, bool) {
        let id = id.and_then(|raw| Uuid::parse_str(raw).ok());

        if let Some(id) = id {
            let key = id.to_string();
            if let Some(visitor) = self.visitors.read().await.get(&key) {
                visitor.touch();
                return (visitor.clone(), false);
            }
            // Known to disk but not yet (or no longer) to this process
            if self.session_dir.is_some() {
                self.sweep_if_due().await;
                let visitor = self.insert(key).await;
                return (visitor, false);
            }
        }

        self.sweep_if_due().await;
        let key = Uuid::new_v4().to_string();
        tracing::debug!(visitor = %key, "New visitor");
        (self.insert(key).await, true)
    }

    async fn insert(&self, id: String) -> Arc<Visitor> {
        let mut visitors = self.visitors.write().await;
        if let Some(existing) = visitors.get(&id) {
            existing.touch();
            return existing.clone();
        }
        let visitor = Arc::new(Visitor {
            auth: AuthSession::new(self.storage_for(&id)),
            suggestions: SuggestionEngine::new(self.debounce),
            search: SearchView::default(),
            last_seen: Mutex::new(Instant::now()),
            id: id.clone(),
        });
        visitors.insert(id, visitor.clone());
        visitor
    }

    async fn sweep_if_due(&self) {
        {
            let mut last_sweep = self.last_sweep.lock().unwrap_or_else(|e| e.into_inner());
            if last_sweep.elapsed() < SWEEP_INTERVAL {
                return;
            }
            *last_sweep = Instant::now();
        }
        self.sweep().await;
    }

    /// Drops visitors idle past the TTL. Visitors still held by an in-flight
    /// request are kept. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut visitors = self.visitors.write().await;
        let before = visitors.len();
        visitors.retain(|_, visitor| {
            Arc::strong_count(visitor) > 1 || visitor.idle_for(now) < self.idle_ttl
        });
        let dropped = before - visitors.len();
        if dropped > 0 {
            tracing::debug!(dropped, remaining = visitors.len(), "Dropped idle visitors");
        }
        dropped
    }

    fn storage_for(&self, id: &str) -> Arc<dyn SessionStorage> {
        let Some(dir) = &self.session_dir else {
            return Arc::new(MemoryStorage::new());
        };
        let path = dir.join(format!("{id}.json"));
        match FileStorage::open(&path) {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                tracing::warn!("Falling back to in-memory session storage: {e:#}");
                Arc::new(MemoryStorage::new())
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.visitors.read().await.len()
    }
}
