//! System notifications requested by the engine.
//!
//! `Notification:Show` and `Notification:Hide` arrive as native bundles (the
//! icon travels as raw bytes). Presentation is handed to a [`SerialWorker`]
//! so a show and a later hide for the same id are applied in order, off the
//! dispatching thread.

use std::sync::{Arc, Weak};

use shellbus_protocol::{Bundle, BundleValue};
use shellbus_runtime::{BundleListener, EventDispatcher, Result, SerialWorker, Subscriber};

pub const SHOW_EVENT: &str = "Notification:Show";
pub const HIDE_EVENT: &str = "Notification:Hide";

const EVENTS: [&str; 2] = [SHOW_EVENT, HIDE_EVENT];

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub text: String,
    pub icon: Option<Vec<u8>>,
    /// Cannot be swiped away by the user.
    pub ongoing: bool,
}

impl Notification {
    fn from_bundle(message: &Bundle) -> Option<Self> {
        let id = message.get_str("id").filter(|id| !id.is_empty())?;
        let icon = match message.get("icon") {
            Some(BundleValue::Bytes(bytes)) => Some(bytes.clone()),
            _ => None,
        };

        Some(Self {
            id: id.to_string(),
            title: message.get_str("title").unwrap_or_default().to_string(),
            text: message.get_str("text").unwrap_or_default().to_string(),
            icon,
            ongoing: message.get_bool("ongoing").unwrap_or(false),
        })
    }
}

/// Platform side that actually draws notifications.
pub trait NotificationPresenter: Send + Sync + 'static {
    fn show(&self, notification: &Notification);
    fn hide(&self, id: &str);
}

pub struct NotificationClient {
    dispatcher: Weak<EventDispatcher>,
    presenter: Arc<dyn NotificationPresenter>,
    worker: SerialWorker,
}

impl NotificationClient {
    /// Subscribes a client to the notification events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(
        dispatcher: &Arc<EventDispatcher>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Result<Arc<Self>> {
        let client = Arc::new(Self {
            dispatcher: Arc::downgrade(dispatcher),
            presenter,
            worker: SerialWorker::spawn("notifications"),
        });
        dispatcher.register(&client.subscriber(), &EVENTS)?;
        Ok(client)
    }

    /// Unsubscribes and waits for pending presentations to finish.
    pub async fn shutdown(self: &Arc<Self>) -> Result<()> {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unregister(&self.subscriber(), &EVENTS)?;
        }
        self.worker.shutdown().await;
        Ok(())
    }

    fn subscriber(self: &Arc<Self>) -> Subscriber {
        Subscriber::Native(Arc::clone(self) as Arc<dyn BundleListener>)
    }

    fn submit(&self, event: &str, job: impl FnOnce() + Send + 'static) {
        if let Err(e) = self.worker.submit(job) {
            tracing::warn!(event, "Dropping notification update: {}", e);
        }
    }
}

impl BundleListener for NotificationClient {
    fn handle_message(&self, event: &str, message: &Bundle) {
        match event {
            SHOW_EVENT => {
                let Some(notification) = Notification::from_bundle(message) else {
                    tracing::warn!(event, "Notification without id");
                    return;
                };
                let presenter = Arc::clone(&self.presenter);
                self.submit(event, move || presenter.show(&notification));
            }
            HIDE_EVENT => {
                let Some(id) = message.get_str("id").map(str::to_string) else {
                    tracing::warn!(event, "Notification without id");
                    return;
                };
                let presenter = Arc::clone(&self.presenter);
                self.submit(event, move || presenter.hide(&id));
            }
            other => tracing::debug!(event = other, "Unexpected event for notifications"),
        }
    }
}

impl std::fmt::Debug for NotificationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationClient")
            .field("worker", &self.worker)
            .finish()
    }
}
