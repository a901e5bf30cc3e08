//! Kubernetes Events for rollout traffic changes.

use crate::crd::rollout::Rollout;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Resource;
use tracing::warn;

/// Default reporting controller name for published events
const DEFAULT_CONTROLLER_NAME: &str = "kulta-controller";

/// Event action recorded for every traffic routing event
const TRAFFIC_ROUTING_ACTION: &str = "TrafficRouting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// An event about the rollout being reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutEvent {
    pub kind: EventKind,
    pub reason: String,
    pub note: String,
}

impl RolloutEvent {
    pub fn normal(reason: &str, note: impl Into<String>) -> Self {
        RolloutEvent {
            kind: EventKind::Normal,
            reason: reason.to_string(),
            note: note.into(),
        }
    }

    pub fn warning(reason: &str, note: impl Into<String>) -> Self {
        RolloutEvent {
            kind: EventKind::Warning,
            reason: reason.to_string(),
            note: note.into(),
        }
    }
}

/// Trait for recording rollout events
///
/// Fire-and-forget: recording never fails the caller.
/// Production code uses `KubeEventRecorder`.
/// Tests use `MockEventRecorder` which stores events in memory for assertions.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: RolloutEvent);
}

/// Publishes events.k8s.io Events that reference a Rollout
pub struct KubeEventRecorder {
    recorder: Recorder,
    reference: ObjectReference,
}

impl KubeEventRecorder {
    /// Create a recorder for events about `rollout`
    ///
    /// Configuration from environment variables:
    /// - KULTA_CONTROLLER_NAME: reporting controller (default: kulta-controller)
    /// - POD_NAME: reporting instance (optional)
    pub fn new(client: kube::Client, rollout: &Rollout) -> Self {
        let reporter = Reporter {
            controller: std::env::var("KULTA_CONTROLLER_NAME")
                .unwrap_or_else(|_| DEFAULT_CONTROLLER_NAME.to_string()),
            instance: std::env::var("POD_NAME").ok(),
        };

        KubeEventRecorder {
            recorder: Recorder::new(client, reporter),
            reference: rollout.object_ref(&()),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, event: RolloutEvent) {
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };

        let k8s_event = Event {
            type_,
            reason: event.reason.clone(),
            note: Some(event.note),
            action: TRAFFIC_ROUTING_ACTION.to_string(),
            secondary: None,
        };

        if let Err(e) = self.recorder.publish(&k8s_event, &self.reference).await {
            warn!(
                error = %e,
                reason = %event.reason,
                rollout = ?self.reference.name,
                "Failed to publish rollout event"
            );
        }
    }
}

/// Mock event recorder for testing - stores events in memory
#[cfg(test)]
pub struct MockEventRecorder {
    events: std::sync::Arc<std::sync::Mutex<Vec<RolloutEvent>>>,
}

#[cfg(test)]
impl Default for MockEventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEventRecorder {
    pub fn new() -> Self {
        MockEventRecorder {
            events: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn get_recorded_events(&self) -> Vec<RolloutEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.get_recorded_events()
            .into_iter()
            .map(|e| e.reason)
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl EventRecorder for MockEventRecorder {
    async fn record(&self, event: RolloutEvent) {
        #[allow(clippy::unwrap_used)]
        self.events.lock().unwrap().push(event);
    }
}
