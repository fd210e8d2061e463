//! Recency-ordered registry of idle connections

use std::collections::VecDeque;
use tokio::time::Instant;

/// An idle connection together with its lifecycle timestamps
#[derive(Debug)]
pub(crate) struct IdleEntry<C> {
    pub conn: C,
    pub idle_since: Instant,
    pub created_at: Instant,
}

impl<C> IdleEntry<C> {
    pub fn new(conn: C, created_at: Instant, idle_since: Instant) -> Self {
        Self {
            conn,
            idle_since,
            created_at,
        }
    }
}

/// Idle connections with the most recently idled at the front.
///
/// Entries only ever enter at the front, so `idle_since` is non-increasing
/// from front to back and the back holds the least recently used entry.
#[derive(Debug)]
pub(crate) struct IdleRegistry<C> {
    entries: VecDeque<IdleEntry<C>>,
}

impl<C> IdleRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn push_front(&mut self, entry: IdleEntry<C>) {
        self.entries.push_front(entry);
    }

    pub fn pop_front(&mut self) -> Option<IdleEntry<C>> {
        self.entries.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<IdleEntry<C>> {
        self.entries.pop_back()
    }

    pub fn back(&self) -> Option<&IdleEntry<C>> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detach every entry, leaving the registry empty
    pub fn take_all(&mut self) -> Vec<IdleEntry<C>> {
        self.entries.drain(..).collect()
    }
}

impl<C> Default for IdleRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
