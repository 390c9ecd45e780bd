use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub type SharedAreaNames = Arc<Mutex<AreaNameCache>>;

#[derive(Debug, Clone)]
struct CachedName {
    name: Option<String>,
    inserted: Instant,
}

/// Area code to display name, bounded by `capacity` with entries expiring
/// after `ttl`. The oldest insertion is evicted first. Codes with no name are
/// cached too.
#[derive(Debug)]
pub struct AreaNameCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, CachedName>,
    order: VecDeque<String>,
}

impl AreaNameCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn shared(capacity: usize, ttl: Duration) -> SharedAreaNames {
        Arc::new(Mutex::new(Self::new(capacity, ttl)))
    }

    /// `None` on a miss; `Some(None)` for a code known to have no name.
    pub fn get(&mut self, code: &str) -> Option<Option<String>> {
        let expired = {
            let entry = self.entries.get(code)?;
            entry.inserted.elapsed() >= self.ttl
        };
        if expired {
            self.entries.remove(code);
            self.order.retain(|c| c != code);
            return None;
        }
        self.entries.get(code).map(|e| e.name.clone())
    }

    pub fn insert(&mut self, code: String, name: Option<String>) {
        let entry = CachedName {
            name,
            inserted: Instant::now(),
        };
        if self.entries.insert(code.clone(), entry).is_some() {
            return;
        }
        self.order.push_back(code);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn invalidate(&mut self) {
        tracing::debug!("Clearing {} cached area names", self.entries.len());
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
