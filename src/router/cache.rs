//! TTL cache for subdomain route lookups.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::TenantRoute;

/// Routes change rarely, so cached entries serve reads for up to the TTL
/// unless a lifecycle transition invalidates them first.
pub struct RouteCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedRoute>>,
}

struct CachedRoute {
    route: TenantRoute,
    cached_at: Instant,
}

impl RouteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, subdomain: &str) -> Option<TenantRoute> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match entries.get(subdomain) {
            Some(cached) if cached.cached_at.elapsed() < self.ttl => Some(cached.route.clone()),
            Some(_) => {
                entries.remove(subdomain);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, route: TenantRoute) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        entries.insert(
            route.subdomain.clone(),
            CachedRoute {
                route,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, subdomain: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        entries.remove(subdomain);
    }
}
