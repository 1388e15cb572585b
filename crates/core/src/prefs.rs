//! Preference cache fed by the engine.
//!
//! The engine pushes `Preferences:Data` snapshots; the shell answers
//! `Preferences:Get` from its cache, either as an asynchronous `:Return`
//! reply (request carries a `GUID`) or through the synchronous responder
//! path.
//!
//! ```text
//! {"type": "Preferences:Data", "preferences": [{"name": "a", "value": 1}]}
//! {"type": "Preferences:Get", "GUID": "7", "preferences": ["a", "b"]}
//!   -> {"type": "Preferences:Get:Return", "GUID": "7",
//!       "response": {"preferences": [{"name": "a", "value": 1},
//!                                    {"name": "b", "value": null}]}}
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Value, json};
use shellbus_protocol::{Correlation, Envelope};
use shellbus_runtime::{EventDispatcher, JsonListener, Responder, Result, Subscriber};

pub const DATA_EVENT: &str = "Preferences:Data";
pub const GET_EVENT: &str = "Preferences:Get";

const EVENTS: [&str; 2] = [DATA_EVENT, GET_EVENT];

#[derive(Debug, Deserialize)]
struct PrefEntry {
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct DataMessage {
    #[serde(default)]
    preferences: Vec<PrefEntry>,
}

#[derive(Debug, Deserialize)]
struct GetMessage {
    #[serde(default)]
    preferences: Vec<String>,
}

pub struct PreferencesStore {
    dispatcher: Weak<EventDispatcher>,
    values: RwLock<BTreeMap<String, Value>>,
}

impl PreferencesStore {
    /// Creates a store and subscribes it to the preference events.
    pub fn attach(dispatcher: &Arc<EventDispatcher>) -> Result<Arc<Self>> {
        let store = Arc::new(Self {
            dispatcher: Arc::downgrade(dispatcher),
            values: RwLock::new(BTreeMap::new()),
        });
        dispatcher.register(&store.subscriber(), &EVENTS)?;
        Ok(store)
    }

    /// Unsubscribes from the preference events. The cache is kept.
    pub fn detach(self: &Arc<Self>) -> Result<()> {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.unregister(&self.subscriber(), &EVENTS),
            None => Ok(()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    fn subscriber(self: &Arc<Self>) -> Subscriber {
        Subscriber::Structured(Arc::clone(self) as Arc<dyn JsonListener>)
    }

    fn apply(&self, message: &Value) {
        let data = match DataMessage::deserialize(message) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(event = DATA_EVENT, "Malformed preference data: {}", e);
                return;
            }
        };

        let mut values = self.values.write();
        for entry in data.preferences {
            values.insert(entry.name, entry.value);
        }
        tracing::debug!(count = values.len(), "Preferences updated");
    }

    fn lookup(&self, request: &Value) -> Option<Value> {
        let request = match GetMessage::deserialize(request) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(event = GET_EVENT, "Malformed preference request: {}", e);
                return None;
            }
        };

        let values = self.values.read();
        let preferences: Vec<Value> = request
            .preferences
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "value": values.get(name).cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
        Some(json!({ "preferences": preferences }))
    }
}

impl JsonListener for PreferencesStore {
    fn handle_message(&self, event: &str, message: &Value) {
        match event {
            DATA_EVENT => self.apply(message),
            // Requests without a GUID come through the synchronous path and
            // are answered by `get_response`.
            GET_EVENT => {
                if !matches!(message.correlation(), Correlation::Present(_)) {
                    return;
                }
                let (Some(dispatcher), Some(reply)) =
                    (self.dispatcher.upgrade(), self.lookup(message))
                else {
                    return;
                };
                dispatcher.send_response(message, reply);
            }
            other => tracing::debug!(event = other, "Unexpected event for preferences"),
        }
    }

    fn as_responder(&self) -> Option<&dyn Responder> {
        Some(self)
    }
}

impl Responder for PreferencesStore {
    fn get_response(&self, event: &str, request: &Value) -> Option<Value> {
        (event == GET_EVENT).then(|| self.lookup(request)).flatten()
    }
}

impl std::fmt::Debug for PreferencesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferencesStore")
            .field("len", &self.len())
            .finish()
    }
}
