// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pessimistic per-entity locks.
//
// A lock is keyed by entity kind and id and is held by an `EntityGuard`
// until the owning transaction commits or rolls back (the guard is dropped).
// Waiting is bounded: a request that cannot be granted within the timeout
// fails with `LockFailed` instead of being retried.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use pagetally_core::error::{PageTallyError, Result};
use tracing::{debug, warn};

/// Identifies one lockable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: &'static str,
    pub id: i64,
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    held: Mutex<HashSet<EntityKey>>,
    released: Condvar,
}

/// Registry of currently held entity locks.
#[derive(Debug, Clone, Default)]
pub struct EntityLocks {
    inner: Arc<Inner>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free (or `timeout` passes) and take it.
    pub fn acquire(&self, key: EntityKey, timeout: Duration) -> Result<EntityGuard> {
        let deadline = Instant::now() + timeout;
        let mut held = self
            .inner
            .held
            .lock()
            .map_err(|_| PageTallyError::LockFailed(format!("{key}: registry poisoned")))?;

        while held.contains(&key) {
            let now = Instant::now();
            if now >= deadline {
                warn!(%key, timeout_ms = timeout.as_millis() as u64, "entity lock timed out");
                return Err(PageTallyError::LockFailed(key.to_string()));
            }
            let (guard, _) = self
                .inner
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| PageTallyError::LockFailed(format!("{key}: registry poisoned")))?;
            held = guard;
        }

        held.insert(key);
        debug!(%key, "entity lock acquired");
        Ok(EntityGuard {
            inner: Arc::clone(&self.inner),
            key,
        })
    }

    /// Whether `key` is currently held by anyone.
    pub fn is_held(&self, key: EntityKey) -> bool {
        self.inner
            .held
            .lock()
            .map(|held| held.contains(&key))
            .unwrap_or(false)
    }
}

/// Releases its entity lock on drop.
#[derive(Debug)]
pub struct EntityGuard {
    inner: Arc<Inner>,
    key: EntityKey,
}

impl EntityGuard {
    pub fn key(&self) -> EntityKey {
        self.key
    }
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        let mut held = match self.inner.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.key);
        drop(held);
        self.inner.released.notify_all();
        debug!(key = %self.key, "entity lock released");
    }
}
