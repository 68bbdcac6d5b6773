use crate::core::{Delivery, DeliveryQueue};
use crate::discovery::traits::DiscoveryNotifier;
use std::sync::Arc;

/// Drains one session's delivery queue into its notifier.
///
/// Runs on its own task, so callbacks never execute on the caller's context
/// and a slow notifier only delays its own session. The notifier is dropped
/// right after the terminal callback.
pub(crate) async fn dispatch(mut queue: DeliveryQueue, notifier: Arc<dyn DiscoveryNotifier>) {
    let id = queue.id();

    while let Some(delivery) = queue.next().await {
        match delivery {
            Delivery::ResourcesFound {
                service_address,
                resources,
            } => {
                tracing::debug!(
                    "Session {}: {} resource(s) from {}",
                    id,
                    resources.len(),
                    service_address
                );
                notifier.on_resources_found(&service_address, &resources);
            }
            Delivery::Completed => {
                notifier.on_completed();
                break;
            }
            Delivery::Failed(error) => {
                notifier.on_failed(error);
                break;
            }
            Delivery::Release => break,
        }
    }

    drop(notifier);
    tracing::trace!("Session {}: notifier released", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionEntry;
    use crate::discovery::notifier::{ChannelNotifier, DiscoveryEvent};
    use crate::error::DiscoveryError;
    use crate::protocol::{DiscoveryQuery, ResourceDescriptor, SessionId};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_dispatch_stops_at_terminal() {
        let (entry, queue) =
            SessionEntry::new(SessionId::new(), DiscoveryQuery::all(), CancellationToken::new());
        let (notifier, mut events) = ChannelNotifier::new();

        entry
            .report(
                "coap://10.0.0.5".to_string(),
                vec![ResourceDescriptor::new("/light/1", "coap://10.0.0.5")],
            )
            .unwrap();
        entry.fail(DiscoveryError::Cancelled).unwrap();

        dispatch(queue, Arc::new(notifier)).await;

        // The queued batch was suppressed by the failure
        assert!(matches!(
            events.recv().await,
            Some(DiscoveryEvent::Failed(DiscoveryError::Cancelled))
        ));
        // Notifier dropped: channel closes
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_release_drops_notifier_silently() {
        let (entry, queue) =
            SessionEntry::new(SessionId::new(), DiscoveryQuery::all(), CancellationToken::new());
        let (notifier, mut events) = ChannelNotifier::new();

        entry.release().unwrap();
        dispatch(queue, Arc::new(notifier)).await;

        assert!(events.recv().await.is_none());
    }
}
