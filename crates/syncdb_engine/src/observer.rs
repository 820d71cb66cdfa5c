//! Applied-change notifications.

use syncdb_protocol::Fields;
use tokio::sync::broadcast;

/// Receives notifications for remote changes that were actually applied.
///
/// Stale changes never reach an observer.
pub trait ChangeObserver: Send + Sync {
    /// A row was created or replaced by a remote change.
    fn object_added(&self, id: &str, fields: &Fields);

    /// A row was deleted by a remote change.
    fn object_removed(&self, id: &str);

    /// The whole collection was replaced by a force sync.
    fn collection_replaced(&self) {}
}

/// An applied-change event.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
    /// See [`ChangeObserver::object_added`].
    Added {
        /// Record id.
        id: String,
        /// New row.
        fields: Fields,
    },
    /// See [`ChangeObserver::object_removed`].
    Removed {
        /// Record id.
        id: String,
    },
    /// See [`ChangeObserver::collection_replaced`].
    Replaced,
}

/// Publishes [`ObjectEvent`]s on a broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: broadcast::Sender<ObjectEvent>,
}

impl ChannelObserver {
    /// Creates an observer and a first receiver.
    ///
    /// Slow receivers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<ObjectEvent>) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Creates another receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: ObjectEvent) {
        // No receivers is not an error for a notification.
        let _ = self.sender.send(event);
    }
}

impl ChangeObserver for ChannelObserver {
    fn object_added(&self, id: &str, fields: &Fields) {
        self.publish(ObjectEvent::Added {
            id: id.to_string(),
            fields: fields.clone(),
        });
    }

    fn object_removed(&self, id: &str) {
        self.publish(ObjectEvent::Removed { id: id.to_string() });
    }

    fn collection_replaced(&self) {
        self.publish(ObjectEvent::Replaced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncdb_protocol::Value;

    #[test]
    fn channel_observer_publishes_events() {
        let (observer, mut rx) = ChannelObserver::new(8);
        let mut fields = Fields::new();
        fields.insert("v".into(), Value::from(1));

        observer.object_added("x", &fields);
        observer.object_removed("y");
        observer.collection_replaced();

        assert_eq!(
            rx.try_recv().unwrap(),
            ObjectEvent::Added {
                id: "x".into(),
                fields
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ObjectEvent::Removed { id: "y".into() });
        assert_eq!(rx.try_recv().unwrap(), ObjectEvent::Replaced);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publishing_without_receivers_is_fine() {
        let (observer, rx) = ChannelObserver::new(1);
        drop(rx);
        observer.object_removed("x");

        let mut late = observer.subscribe();
        observer.object_removed("z");
        assert_eq!(late.try_recv().unwrap(), ObjectEvent::Removed { id: "z".into() });
    }
}
