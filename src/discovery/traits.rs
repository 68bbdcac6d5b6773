use crate::error::{DiscoveryError, Result};
use crate::protocol::ResourceDescriptor;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause between a failed receive and the next attempt
pub(crate) const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Receives the results of one discovery session.
///
/// Per session the engine calls `on_resources_found` zero or more times, then
/// exactly one of `on_completed` or `on_failed`, and nothing afterwards. Calls
/// arrive on the engine's tasks, not the caller's; implementations should hand
/// work off instead of blocking.
pub trait DiscoveryNotifier: Send + Sync {
    /// A batch of resources reported by one service. Batches from the same
    /// service arrive in the order the service sent them.
    fn on_resources_found(&self, service_address: &str, resources: &[ResourceDescriptor]);

    /// Every result has been reported and the session ended normally.
    fn on_completed(&self);

    /// The session ended abnormally; no results follow.
    fn on_failed(&self, error: DiscoveryError);
}

impl<T: DiscoveryNotifier + ?Sized> DiscoveryNotifier for Arc<T> {
    fn on_resources_found(&self, service_address: &str, resources: &[ResourceDescriptor]) {
        (**self).on_resources_found(service_address, resources)
    }

    fn on_completed(&self) {
        (**self).on_completed()
    }

    fn on_failed(&self, error: DiscoveryError) {
        (**self).on_failed(error)
    }
}

/// Where a discovery request is sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Every service listening on the discovery group
    Multicast,
    /// A single service at `ip:port`
    Host(String),
}

/// A payload received from a remote service
#[derive(Clone, Debug)]
pub struct Datagram {
    /// Address of the responding service, e.g. `coap://10.0.0.5:5683`
    pub source: String,
    pub payload: Bytes,
}

/// Datagram transport used by the discovery engine
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, destination: &Destination, payload: Bytes) -> Result<()>;

    /// Wait for the next inbound datagram.
    ///
    /// Returns [`DiscoveryError::TransportClosed`] once no more datagrams can arrive.
    async fn recv(&self) -> Result<Datagram>;
}

/// Wait out [`RECV_ERROR_BACKOFF`] after a receive error.
///
/// Returns `false` if `shutdown` fired first and the receive loop should exit.
pub(crate) async fn pause_after_recv_error(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => true,
    }
}
