//! Copy-on-write listener registry.
//!
//! Each event type maps to an immutable `Arc<[Arc<L>]>` snapshot. Writers
//! build a new slice under the registry lock and swap it in; dispatchers clone
//! the `Arc` under the lock and iterate after releasing it, so a listener that
//! registers or unregisters during delivery never invalidates the slice being
//! walked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::listener::{ListenerKind, same_listener};

/// Ordered listeners for one event type, in registration order.
pub type Snapshot<L> = Arc<[Arc<L>]>;

pub(crate) struct ListenerRegistry<L: ?Sized> {
    kind: ListenerKind,
    entries: Mutex<HashMap<String, Snapshot<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Returns true if an entry exists for `event`, even an empty one.
    pub fn contains(&self, event: &str) -> bool {
        self.entries.lock().contains_key(event)
    }

    /// First of `events` that has an entry here.
    pub fn first_registered<'a>(&self, events: &[&'a str]) -> Option<&'a str> {
        let entries = self.entries.lock();
        events.iter().copied().find(|e| entries.contains_key(*e))
    }

    /// Current listeners for `event`, or `None` if no entry was ever created.
    pub fn snapshot(&self, event: &str) -> Option<Snapshot<L>> {
        self.entries.lock().get(event).cloned()
    }

    /// Appends `listener` to the entry of every event, creating entries lazily.
    pub fn add(&self, listener: &Arc<L>, events: &[&str]) {
        let mut entries = self.entries.lock();
        for event in events {
            let updated: Snapshot<L> = match entries.get(*event) {
                Some(current) => current
                    .iter()
                    .cloned()
                    .chain(std::iter::once(Arc::clone(listener)))
                    .collect(),
                None => Arc::from([Arc::clone(listener)]),
            };
            entries.insert((*event).to_string(), updated);
        }
    }

    /// Removes `listener` from the entry of every event.
    ///
    /// Fails without touching any entry if the listener is missing from one of
    /// them. Entries left empty are kept, so the type stays claimed by this
    /// registry.
    pub fn remove(&self, listener: &Arc<L>, events: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock();

        if let Some(missing) = events.iter().find(|event| {
            !entries
                .get(**event)
                .is_some_and(|current| current.iter().any(|l| same_listener(l, listener)))
        }) {
            return Err(Error::IllegalArgument {
                event: (*missing).to_string(),
            });
        }

        for event in events {
            if let Some(current) = entries.get_mut(*event) {
                let mut removed = false;
                let updated: Snapshot<L> = current
                    .iter()
                    .filter(|l| {
                        if !removed && same_listener(*l, listener) {
                            removed = true;
                            false
                        } else {
                            true
                        }
                    })
                    .cloned()
                    .collect();
                *current = updated;
            }
        }
        Ok(())
    }

    /// Registered event types, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.entries.lock().keys().cloned().collect();
        events.sort();
        events
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.entries.lock().get(event).map_or(0, |l| l.len())
    }
}
