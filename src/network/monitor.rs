use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::NetworkStatus;
use crate::error::ConnectivityError;

const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Platform hook that reports network availability.
///
/// `register` hands the observer a [`StatusSink`] to push changes into;
/// implementations may call the sink synchronously from inside `register`.
pub trait NetworkObserver: Send + Sync + 'static {
    /// Best-effort availability right now.
    fn current_status(&self) -> NetworkStatus;

    fn register(&self, sink: StatusSink) -> Result<(), ConnectivityError>;

    fn unregister(&self);
}

struct MonitorState {
    subscribers: usize,
    registered: bool,
    last: Option<NetworkStatus>,
}

struct MonitorShared {
    observer: Arc<dyn NetworkObserver>,
    tx: broadcast::Sender<NetworkStatus>,
    state: Mutex<MonitorState>,
}

impl MonitorShared {
    fn publish(&self, status: NetworkStatus) {
        let mut state = self.state.lock();
        if state.last == Some(status) {
            return;
        }
        state.last = Some(status);
        debug!("Network status changed: {}", status);
        // Sent under the lock so subscribers see changes in publish order.
        let _ = self.tx.send(status);
    }
}

/// Write end handed to a [`NetworkObserver`].
#[derive(Clone)]
pub struct StatusSink {
    shared: Weak<MonitorShared>,
}

impl StatusSink {
    pub fn send(&self, status: NetworkStatus) {
        if let Some(shared) = self.shared.upgrade() {
            shared.publish(status);
        }
    }
}

/// Shared, reference-counted view over a platform network observer.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    shared: Arc<MonitorShared>,
}

impl ConnectivityMonitor {
    pub fn new(observer: Arc<dyn NetworkObserver>) -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(MonitorShared {
                observer,
                tx,
                state: Mutex::new(MonitorState {
                    subscribers: 0,
                    registered: false,
                    last: None,
                }),
            }),
        }
    }

    fn sink(&self) -> StatusSink {
        StatusSink {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Start observing. The first value yielded is the current state.
    pub fn subscribe(&self) -> ConnectivitySubscription {
        let should_register = {
            let mut state = self.shared.state.lock();
            state.subscribers += 1;
            if state.registered {
                false
            } else {
                state.registered = true;
                true
            }
        };

        if should_register {
            if let Err(e) = self.shared.observer.register(self.sink()) {
                warn!("{}; falling back to a single status snapshot", e);
                self.shared.state.lock().registered = false;
            }
            self.shared.publish(self.shared.observer.current_status());
        }

        let (rx, last) = {
            let state = self.shared.state.lock();
            (self.shared.tx.subscribe(), state.last)
        };
        let initial = last.unwrap_or_else(|| self.shared.observer.current_status());

        ConnectivitySubscription {
            shared: self.shared.clone(),
            rx,
            pending: Some(initial),
            last: None,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers
    }

    /// Whether the platform observer is currently registered.
    pub fn is_registered(&self) -> bool {
        self.shared.state.lock().registered
    }
}

/// One subscriber's view of the status stream. Dropping the last
/// subscription unregisters the platform observer.
pub struct ConnectivitySubscription {
    shared: Arc<MonitorShared>,
    rx: broadcast::Receiver<NetworkStatus>,
    pending: Option<NetworkStatus>,
    last: Option<NetworkStatus>,
}

impl ConnectivitySubscription {
    /// Next status that differs from the previously yielded one.
    pub async fn next(&mut self) -> Option<NetworkStatus> {
        if let Some(status) = self.pending.take() {
            self.last = Some(status);
            return Some(status);
        }

        loop {
            match self.rx.recv().await {
                Ok(status) if Some(status) == self.last => continue,
                Ok(status) => {
                    self.last = Some(status);
                    return Some(status);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Connectivity subscriber lagged by {} updates", skipped);
                    let latest = self.shared.state.lock().last;
                    if let Some(status) = latest {
                        if Some(status) != self.last {
                            self.last = Some(status);
                            return Some(status);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl futures::Stream<Item = NetworkStatus> + Send {
        let mut subscription = self;
        async_stream::stream! {
            while let Some(status) = subscription.next().await {
                yield status;
            }
        }
    }
}

impl Drop for ConnectivitySubscription {
    fn drop(&mut self) {
        let release = {
            let mut state = self.shared.state.lock();
            state.subscribers = state.subscribers.saturating_sub(1);
            let release = state.subscribers == 0 && state.registered;
            if release {
                state.registered = false;
            }
            release
        };

        if release {
            self.shared.observer.unregister();
            debug!("Last connectivity subscriber gone, observer unregistered");
        }
    }
}
