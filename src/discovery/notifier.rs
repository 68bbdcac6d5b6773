//! Message-passing notifier.
//!
//! [`ChannelNotifier`] turns each callback into a [`DiscoveryEvent`] on a tokio
//! channel, so results can be consumed from any task, or forwarded across a
//! process boundary, instead of being handled inline on the engine's task.

use crate::discovery::traits::DiscoveryNotifier;
use crate::error::DiscoveryError;
use crate::protocol::ResourceDescriptor;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum DiscoveryEvent {
    ResourcesFound {
        service_address: String,
        resources: Vec<ResourceDescriptor>,
    },
    Completed,
    Failed(DiscoveryError),
}

impl DiscoveryEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ResourcesFound { .. })
    }
}

#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, NotificationReceiver { rx })
    }

    fn forward(&self, event: DiscoveryEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Notification receiver dropped; event discarded");
        }
    }
}

impl DiscoveryNotifier for ChannelNotifier {
    fn on_resources_found(&self, service_address: &str, resources: &[ResourceDescriptor]) {
        self.forward(DiscoveryEvent::ResourcesFound {
            service_address: service_address.to_string(),
            resources: resources.to_vec(),
        });
    }

    fn on_completed(&self) {
        self.forward(DiscoveryEvent::Completed);
    }

    fn on_failed(&self, error: DiscoveryError) {
        self.forward(DiscoveryEvent::Failed(error));
    }
}

pub struct NotificationReceiver {
    rx: mpsc::UnboundedReceiver<DiscoveryEvent>,
}

impl NotificationReceiver {
    /// Next event, or `None` once every notifier handle is gone
    pub async fn recv(&mut self) -> Option<DiscoveryEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = DiscoveryEvent> {
        futures_util::stream::unfold(self, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
    }

    /// Consume events until the session terminates.
    ///
    /// A channel that closes without a terminal event (silent cancellation)
    /// yields [`DiscoveryOutcome::Released`].
    pub async fn collect(mut self) -> DiscoveryReport {
        let mut report = DiscoveryReport::new();

        while let Some(event) = self.recv().await {
            match event {
                DiscoveryEvent::ResourcesFound {
                    service_address,
                    resources,
                } => report.push(service_address, resources),
                DiscoveryEvent::Completed => {
                    report.finish(DiscoveryOutcome::Completed);
                    return report;
                }
                DiscoveryEvent::Failed(error) => {
                    report.finish(DiscoveryOutcome::Failed {
                        reason: error.to_string(),
                    });
                    return report;
                }
            }
        }

        report.finish(DiscoveryOutcome::Released);
        report
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DiscoveryOutcome {
    Pending,
    Completed,
    Failed { reason: String },
    Released,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceResources {
    pub address: String,
    pub resources: Vec<ResourceDescriptor>,
}

/// Results of one session grouped by service, in first-response order
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub services: Vec<ServiceResources>,
    pub outcome: DiscoveryOutcome,
}

impl Default for DiscoveryReport {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            services: Vec::new(),
            outcome: DiscoveryOutcome::Pending,
        }
    }

    pub fn push(&mut self, service_address: String, resources: Vec<ResourceDescriptor>) {
        match self
            .services
            .iter_mut()
            .find(|s| s.address == service_address)
        {
            Some(service) => service.resources.extend(resources),
            None => self.services.push(ServiceResources {
                address: service_address,
                resources,
            }),
        }
    }

    pub fn finish(&mut self, outcome: DiscoveryOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.services.iter().flat_map(|s| s.resources.iter())
    }

    pub fn resource_count(&self) -> usize {
        self.services.iter().map(|s| s.resources.len()).sum()
    }
}
