//! Live query wiring.
//!
//! A live query is an internal bus listener on the query's collection.
//! Every commit batch triggers a re-execution on the notifier thread; the
//! outcome is delivered only when it differs from the last delivered result
//! set. A per-listener mutex serializes the initial delivery (done on the
//! registering thread) with notifier-thread re-evaluations.

use crate::changes::{BusEvent, ListenerToken};
use crate::error::{Error, Result};
use crate::query::{Query, ResultSet};
use parking_lot::Mutex;
use std::sync::Arc;

/// One delivery from a live query: fresh results, or the error the
/// re-evaluation failed with. Collection deletion delivers a final
/// [`Error::CollectionNotFound`].
#[derive(Debug)]
pub struct QueryChange {
    /// The re-evaluated results, or the failure.
    pub result: Result<ResultSet>,
}

impl QueryChange {
    /// The results, if this delivery carries any.
    pub fn results(&self) -> Option<&ResultSet> {
        self.result.as_ref().ok()
    }

    /// The error, if the re-evaluation failed.
    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }
}

type Listener = Box<dyn Fn(QueryChange) + Send + Sync>;

pub(crate) fn attach(query: Query, listener: Listener) -> Result<ListenerToken> {
    let collection = query.collection().clone();
    collection.inner.ensure_open()?;

    let listener: Arc<Listener> = Arc::new(listener);
    // Last delivered results; also serializes deliveries across the
    // registering thread (initial) and the notifier thread (re-evals).
    let last: Arc<Mutex<Option<ResultSet>>> = Arc::new(Mutex::new(None));

    let bus_query = query.clone();
    let bus_listener = Arc::clone(&listener);
    let bus_last = Arc::clone(&last);
    let token = collection.inner.bus.add_listener(
        collection.id,
        None,
        Box::new(move |_, event| match event {
            BusEvent::Changes(_) => {
                let mut last = bus_last.lock();
                match bus_query.execute() {
                    Ok(results) => {
                        if last.as_ref() != Some(&results) {
                            *last = Some(results.clone());
                            bus_listener(QueryChange {
                                result: Ok(results),
                            });
                        }
                    }
                    Err(err) => bus_listener(QueryChange { result: Err(err) }),
                }
            }
            BusEvent::Dropped => {
                bus_listener(QueryChange {
                    result: Err(Error::CollectionNotFound {
                        scope: bus_query.collection().scope().to_string(),
                        name: bus_query.collection().name().to_string(),
                    }),
                });
            }
        }),
    );

    // Initial delivery. A commit racing the registration may have delivered
    // first from the notifier thread; that delivery then serves as the
    // initial one.
    {
        let mut last = last.lock();
        if last.is_none() {
            match query.execute() {
                Ok(results) => {
                    *last = Some(results.clone());
                    listener(QueryChange {
                        result: Ok(results),
                    });
                }
                Err(err) => listener(QueryChange { result: Err(err) }),
            }
        }
    }
    Ok(token)
}
