//! Shared mock connections for integration tests

#![allow(dead_code)]

use dashmap::DashMap;
use esox_connpool::{BoxError, Connection, ErrorRef, Pool, PoolConfiguration};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Records every dial and close made through a pool
#[derive(Default)]
pub struct Tracker {
    next_id: AtomicUsize,
    fail_dials: AtomicBool,
    closes: DashMap<usize, usize>,
}

impl Tracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dial(self: &Arc<Self>) -> Result<MockConn, BoxError> {
        if self.fail_dials.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        Ok(MockConn {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            tracker: Arc::clone(self),
            broken: None,
        })
    }

    pub fn set_fail_dials(&self, fail: bool) {
        self.fail_dials.store(fail, Ordering::SeqCst);
    }

    pub fn dialed(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closes.iter().map(|entry| *entry.value()).sum()
    }

    pub fn close_count(&self, id: usize) -> usize {
        self.closes.get(&id).map(|count| *count).unwrap_or(0)
    }

    /// Highest number of times any single connection was closed
    pub fn max_close_count(&self) -> usize {
        self.closes.iter().map(|entry| *entry.value()).max().unwrap_or(0)
    }
}

pub struct MockConn {
    pub id: usize,
    tracker: Arc<Tracker>,
    pub broken: Option<BoxError>,
}

impl Connection for MockConn {
    fn close(&mut self) -> Result<(), BoxError> {
        *self.tracker.closes.entry(self.id).or_insert(0) += 1;
        Ok(())
    }

    fn err(&self) -> Option<&ErrorRef> {
        self.broken.as_deref()
    }
}

pub fn pool_with(tracker: &Arc<Tracker>, config: PoolConfiguration<MockConn>) -> Pool<MockConn> {
    let tracker = Arc::clone(tracker);
    Pool::new(
        move || {
            let tracker = Arc::clone(&tracker);
            async move { tracker.dial() }
        },
        config,
    )
    .unwrap()
}
