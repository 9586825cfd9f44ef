//! Per-resource exclusive locks keyed by URL hash.
//!
//! Entries are reference counted: every holder and every waiter owns one
//! reference, and the entry is removed as soon as the last one goes away.
//! The table therefore only holds resources that are being resolved right now.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use darkroom_core::UrlHash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct LockEntry {
    mutex: Arc<Mutex<()>>,
    refs: usize,
}

/// Table of per-hash mutexes.
#[derive(Default)]
pub struct LockTable {
    entries: DashMap<UrlHash, LockEntry>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `hash`.
    ///
    /// Cancel safe: dropping the returned future while it waits gives the
    /// reference back, so an abandoned wait never leaks an entry.
    pub async fn lock(self: &Arc<Self>, hash: UrlHash) -> ResourceGuard {
        let ticket = self.check_out(hash);
        let guard = ticket.mutex.clone().lock_owned().await;
        ResourceGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Number of resources currently held or awaited.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_out(self: &Arc<Self>, hash: UrlHash) -> Ticket {
        let mut entry = self.entries.entry(hash).or_insert_with(|| LockEntry {
            mutex: Arc::new(Mutex::new(())),
            refs: 0,
        });
        entry.refs += 1;
        let mutex = entry.mutex.clone();
        drop(entry);

        Ticket {
            table: self.clone(),
            hash,
            mutex,
        }
    }

    fn release(&self, hash: &UrlHash) {
        if let Entry::Occupied(mut occupied) = self.entries.entry(*hash) {
            let entry = occupied.get_mut();
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs == 0 {
                occupied.remove();
            }
        }
    }
}

/// One reference to a table entry.
struct Ticket {
    table: Arc<LockTable>,
    hash: UrlHash,
    mutex: Arc<Mutex<()>>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.table.release(&self.hash);
    }
}

/// Exclusive access to one resource, released on drop.
pub struct ResourceGuard {
    // Field order matters: the mutex is unlocked before the reference is returned.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket,
}
