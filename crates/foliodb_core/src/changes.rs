//! Change notification bus.
//!
//! Committed writes are published to a single notifier thread which delivers
//! them to registered listeners. Collection listeners receive batched change
//! events (consecutive commits coalesced, document ids deduplicated in first
//! occurrence order); document listeners receive one event per commit that
//! touched their document. Within one listener, delivery order matches commit
//! order because a single thread performs all deliveries.
//!
//! Listener callbacks run on the notifier thread. A panicking callback is
//! caught and logged so it cannot take the bus down. Removing a listener
//! waits for any in-flight delivery to that listener to finish, unless the
//! removal itself happens on the notifier thread.

use crate::types::{CollectionId, SequenceNumber};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Opaque handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// A batch of committed changes in one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChange {
    /// Qualified collection name (`scope.collection`).
    pub collection: String,
    /// Ids of changed documents, deduplicated, in first-occurrence order.
    pub doc_ids: Vec<String>,
}

/// A committed change to one watched document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Qualified collection name (`scope.collection`).
    pub collection: String,
    /// Id of the changed document.
    pub doc_id: String,
}

/// Event delivered to a bus listener.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BusEvent {
    /// Documents changed in the listener's collection.
    Changes(Vec<String>),
    /// The listener's collection was deleted. Terminal; no further events.
    Dropped,
}

enum Notification {
    Commit {
        collection_id: CollectionId,
        collection_name: String,
        doc_id: String,
        #[allow(dead_code)]
        sequence: SequenceNumber,
    },
    CollectionDropped {
        collection_id: CollectionId,
    },
    Shutdown,
}

struct ListenerEntry {
    token: ListenerToken,
    collection_id: CollectionId,
    /// Some(id) restricts delivery to commits touching that document.
    target_doc: Option<String>,
    active: AtomicBool,
    /// Held while the callback runs; removal blocks on it.
    delivering: Mutex<()>,
    callback: Box<dyn Fn(&str, BusEvent) + Send + Sync>,
}

struct Shared {
    listeners: RwLock<Vec<Arc<ListenerEntry>>>,
    notifier_thread: RwLock<Option<ThreadId>>,
}

/// The change notification bus for one open database.
pub(crate) struct ChangeBus {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Notification>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    next_token: AtomicU64,
}

impl ChangeBus {
    pub(crate) fn new() -> Self {
        let shared = Arc::new(Shared {
            listeners: RwLock::new(Vec::new()),
            notifier_thread: RwLock::new(None),
        });
        let (tx, rx) = mpsc::channel::<Notification>();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("folio-notifier".to_string())
            .spawn(move || {
                *worker_shared.notifier_thread.write() = Some(thread::current().id());
                loop {
                    let Ok(first) = rx.recv() else { break };
                    let mut batch = Vec::new();
                    let mut done = false;
                    match first {
                        Notification::Shutdown => break,
                        other => batch.push(other),
                    }
                    while let Ok(next) = rx.try_recv() {
                        match next {
                            Notification::Shutdown => {
                                done = true;
                                break;
                            }
                            other => batch.push(other),
                        }
                    }
                    deliver_batch(&worker_shared, batch);
                    if done {
                        break;
                    }
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn notifier thread: {e}"));
        Self {
            shared,
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            next_token: AtomicU64::new(1),
        }
    }

    /// Registers a listener on a collection. The callback receives the
    /// qualified collection name and the event.
    pub(crate) fn add_listener(
        &self,
        collection_id: CollectionId,
        target_doc: Option<String>,
        callback: Box<dyn Fn(&str, BusEvent) + Send + Sync>,
    ) -> ListenerToken {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ListenerEntry {
            token,
            collection_id,
            target_doc,
            active: AtomicBool::new(true),
            delivering: Mutex::new(()),
            callback,
        });
        self.shared.listeners.write().push(entry);
        token
    }

    /// Deactivates a listener. When this returns, no further callbacks will
    /// run and any callback that was in flight has completed. Removing an
    /// unknown or already-removed token is a no-op.
    pub(crate) fn remove_listener(&self, token: ListenerToken) {
        let entry = {
            let mut listeners = self.shared.listeners.write();
            match listeners.iter().position(|l| l.token == token) {
                Some(pos) => listeners.swap_remove(pos),
                None => return,
            }
        };
        entry.active.store(false, Ordering::SeqCst);
        let on_notifier =
            *self.shared.notifier_thread.read() == Some(thread::current().id());
        if !on_notifier {
            // Wait out an in-flight delivery to this listener.
            drop(entry.delivering.lock());
        }
    }

    /// Publishes one committed document change.
    pub(crate) fn publish_commit(
        &self,
        collection_id: CollectionId,
        collection_name: &str,
        doc_id: &str,
        sequence: SequenceNumber,
    ) {
        self.send(Notification::Commit {
            collection_id,
            collection_name: collection_name.to_string(),
            doc_id: doc_id.to_string(),
            sequence,
        });
    }

    /// Publishes a collection deletion. Listeners on the collection receive
    /// a terminal [`BusEvent::Dropped`] and are deactivated.
    pub(crate) fn publish_collection_dropped(&self, collection_id: CollectionId) {
        self.send(Notification::CollectionDropped { collection_id });
    }

    fn send(&self, notification: Notification) {
        if let Some(tx) = self.sender.lock().as_ref() {
            let _ = tx.send(notification);
        }
    }

    /// Stops the notifier thread after draining pending notifications.
    pub(crate) fn close(&self) {
        let sender = self.sender.lock().take();
        if let Some(tx) = sender {
            let _ = tx.send(Notification::Shutdown);
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        self.shared.listeners.write().clear();
    }
}

impl Drop for ChangeBus {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver_batch(shared: &Shared, batch: Vec<Notification>) {
    // Group commits by collection, keeping first-occurrence doc order.
    let mut per_collection: HashMap<CollectionId, (String, Vec<String>)> = HashMap::new();
    let mut commits = Vec::new();
    let mut dropped = Vec::new();
    for notification in batch {
        match notification {
            Notification::Commit {
                collection_id,
                collection_name,
                doc_id,
                ..
            } => {
                let slot = per_collection
                    .entry(collection_id)
                    .or_insert_with(|| (collection_name.clone(), Vec::new()));
                if !slot.1.contains(&doc_id) {
                    slot.1.push(doc_id.clone());
                }
                commits.push((collection_id, collection_name, doc_id));
            }
            Notification::CollectionDropped { collection_id } => dropped.push(collection_id),
            Notification::Shutdown => {}
        }
    }

    let listeners: Vec<Arc<ListenerEntry>> = shared.listeners.read().clone();

    for listener in &listeners {
        if !listener.active.load(Ordering::SeqCst) {
            continue;
        }
        match &listener.target_doc {
            None => {
                if let Some((name, doc_ids)) = per_collection.get(&listener.collection_id) {
                    invoke(listener, name, BusEvent::Changes(doc_ids.clone()));
                }
            }
            Some(target) => {
                for (cid, name, doc_id) in &commits {
                    if *cid == listener.collection_id && doc_id == target {
                        invoke(listener, name, BusEvent::Changes(vec![doc_id.clone()]));
                    }
                }
            }
        }
    }

    for collection_id in dropped {
        for listener in &listeners {
            if listener.collection_id != collection_id {
                continue;
            }
            if listener.active.swap(false, Ordering::SeqCst) {
                invoke(listener, "", BusEvent::Dropped);
            }
        }
        shared
            .listeners
            .write()
            .retain(|l| l.collection_id != collection_id);
    }
}

fn invoke(listener: &ListenerEntry, collection_name: &str, event: BusEvent) {
    let _guard = listener.delivering.lock();
    if !listener.active.load(Ordering::SeqCst) && !matches!(event, BusEvent::Dropped) {
        return;
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        (listener.callback)(collection_name, event)
    }));
    if result.is_err() {
        tracing::error!(collection = collection_name, "change listener panicked");
    }
}
