//! Topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message and a slow subscriber never blocks the control loop.  A
//! subscriber that falls behind loses the oldest events and is told how many
//! it missed.
//!
//! # Topics
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::Diagnostics`] | One [`DiagnosticReport`][rover_types::DiagnosticReport] per control cycle |
//! | [`Topic::ActuatorTargets`] | The target set dispatched each cycle |
//! | [`Topic::Control`] | Inbound re-arm and emergency-stop requests |
//! | [`Topic::SystemAlerts`] | Faults and SAFE_STOP entries |

use rover_types::{DriveError, Event};
use tokio::sync::broadcast;
use tracing::warn;

/// Default per-topic capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Diagnostics,
    ActuatorTargets,
    Control,
    SystemAlerts,
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    diagnostics: broadcast::Sender<Event>,
    actuator_targets: broadcast::Sender<Event>,
    control: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus whose topics each buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (diagnostics, _) = broadcast::channel(capacity);
        let (actuator_targets, _) = broadcast::channel(capacity);
        let (control, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            diagnostics,
            actuator_targets,
            control,
            system_alerts,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of subscribers handed the event.  Publishing with
    /// nobody listening is normal for outbound streams and returns `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Publish `event` on `topic`, failing when nobody is listening.
    ///
    /// Used for control requests, where an unheard request must be reported
    /// back to the operator.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Channel`] when `topic` has no subscribers.
    pub fn try_publish_to(&self, topic: Topic, event: Event) -> Result<usize, DriveError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| DriveError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Subscribe to `topic`.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Current number of subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Diagnostics => &self.diagnostics,
            Topic::ActuatorTargets => &self.actuator_targets,
            Topic::Control => &self.control,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event, surfacing lag to the caller.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive.  `None` when nothing is queued.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
