//! Background expiration sweep.
//!
//! Expired documents already read as absent (reads check expiration), so the
//! sweep exists to reclaim them: it purges every expired document through
//! the normal purge path, which also drops index entries and publishes
//! change events.

use crate::collection::Collection;
use crate::database::DbInner;
use crate::error::Error;
use crate::store::now_millis;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) struct Sweeper {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the sweep thread. It holds only a weak reference, so it never
    /// keeps a dropped database alive.
    pub(crate) fn spawn(inner: Weak<DbInner>, interval: Duration) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("folio-sweeper".to_string())
            .spawn(move || loop {
                {
                    let (lock, cvar) = &*thread_stop;
                    let mut stopped = lock.lock();
                    if !*stopped {
                        cvar.wait_for(&mut stopped, interval);
                    }
                    if *stopped {
                        break;
                    }
                }
                let Some(inner) = inner.upgrade() else { break };
                sweep(&inner);
            })
            .unwrap_or_else(|e| panic!("failed to spawn sweeper thread: {e}"));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the thread and waits for it to exit.
    pub(crate) fn stop(mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sweep(inner: &Arc<DbInner>) {
    let now = now_millis();
    for (id, scope, name) in inner.all_collections() {
        let Some(state) = inner.store.collection(id) else {
            continue;
        };
        let expired = state.expired_ids(now);
        if expired.is_empty() {
            continue;
        }
        let collection = Collection {
            inner: Arc::clone(inner),
            id,
            scope,
            name,
        };
        for doc_id in expired {
            match collection.purge_document_by_id(&doc_id) {
                Ok(()) => {
                    tracing::debug!(
                        collection = %collection.qualified_name(),
                        id = %doc_id,
                        "purged expired document"
                    );
                }
                // Raced with a writer or a closing database.
                Err(Error::DocumentNotFound { .. } | Error::DatabaseClosed) => {}
                Err(err) => {
                    tracing::warn!(
                        collection = %collection.qualified_name(),
                        id = %doc_id,
                        %err,
                        "expiration sweep failed"
                    );
                }
            }
        }
    }
}
