use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::ResourceId;
use super::state::ResourceState;
use crate::errors::ResourceError;

/// A resource changed state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEvent {
    pub id: ResourceId,
    pub name: Arc<str>,
    pub state: ResourceState,
    /// Set when `state` is [`ResourceState::Failed`].
    pub error: Option<ResourceError>,
}

/// Fan-out of [`ResourceEvent`]s to any number of subscribers.
///
/// Subscribers that dropped their receiver are pruned on the next emit.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<flume::Sender<ResourceEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> flume::Receiver<ResourceEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: &ResourceEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(state: ResourceState) -> ResourceEvent {
        ResourceEvent {
            id: ResourceId::new(3),
            name: Arc::from("brick"),
            state,
            error: None,
        }
    }

    #[test]
    fn test_every_subscriber_receives() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(&event(ResourceState::Queued));
        assert_eq!(a.try_recv().map(|e| e.state), Ok(ResourceState::Queued));
        assert_eq!(b.try_recv().map(|e| e.state), Ok(ResourceState::Queued));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::default();
        drop(bus.subscribe());
        let live = bus.subscribe();
        bus.emit(&event(ResourceState::Loading));
        assert_eq!(bus.subscribers.lock().len(), 1);
        assert!(live.try_recv().is_ok());
    }
}
