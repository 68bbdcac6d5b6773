use crate::discovery::traits::{Datagram, Destination, Transport};
use crate::error::{DiscoveryError, Result};
use crate::protocol::{DiscoveryRequest, DiscoveryResponse, SessionId, WireResource};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

/// In-process transport; the paired [`MemoryNetwork`] plays the remote side.
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<SentRequest>,
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Datagram>>>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

/// Remote end of a [`MemoryTransport`]
#[derive(Clone)]
pub struct MemoryNetwork {
    inbound: mpsc::UnboundedSender<Result<Datagram>>,
    outbound: Arc<Mutex<mpsc::UnboundedReceiver<SentRequest>>>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

#[derive(Clone, Debug)]
pub struct SentRequest {
    pub destination: Destination,
    pub payload: Bytes,
}

impl SentRequest {
    pub fn request(&self) -> Result<DiscoveryRequest> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryNetwork) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicUsize::new(0));
        let attempts = Arc::new(AtomicUsize::new(0));

        let transport = Self {
            outbound: out_tx,
            inbound: Mutex::new(in_rx),
            failures: failures.clone(),
            attempts: attempts.clone(),
        };
        let network = MemoryNetwork {
            inbound: in_tx,
            outbound: Arc::new(Mutex::new(out_rx)),
            failures,
            attempts,
        };
        (transport, network)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, destination: &Destination, payload: Bytes) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        let failing = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(DiscoveryError::transport("network unreachable"));
        }

        // A missing remote side behaves like a lost datagram
        let _ = self.outbound.send(SentRequest {
            destination: destination.clone(),
            payload,
        });
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Err(DiscoveryError::TransportClosed))
    }
}

impl MemoryNetwork {
    /// Inject a raw datagram as if `source` had sent it
    pub fn deliver(&self, source: impl Into<String>, payload: impl Into<Bytes>) {
        let _ = self.inbound.send(Ok(Datagram {
            source: source.into(),
            payload: payload.into(),
        }));
    }

    /// Make the transport's next receive fail with a transport error
    pub fn fail_next_recv(&self, message: impl Into<String>) {
        let _ = self.inbound.send(Err(DiscoveryError::transport(message)));
    }

    /// Inject a well-formed discovery response for `token`
    pub fn respond(&self, source: impl Into<String>, token: SessionId, oc: Vec<WireResource>) {
        let response = DiscoveryResponse { token, oc };
        match serde_json::to_vec(&response) {
            Ok(payload) => self.deliver(source, payload),
            Err(e) => tracing::error!("Failed to encode memory response: {}", e),
        }
    }

    /// Next request the engine sent, or `None` once the transport is gone
    pub async fn next_request(&self) -> Option<SentRequest> {
        self.outbound.lock().await.recv().await
    }

    /// Make the next `n` sends fail with a transport error
    pub fn fail_next_sends(&self, n: usize) {
        self.failures.store(n, Ordering::Release);
    }

    pub fn fail_all_sends(&self) {
        self.failures.store(usize::MAX, Ordering::Release);
    }

    /// Number of send attempts made so far, failed ones included
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DiscoveryQuery;

    #[tokio::test]
    async fn test_send_reaches_network() {
        let (transport, network) = MemoryTransport::new();
        let request = DiscoveryRequest::new(SessionId::new(), &DiscoveryQuery::all());
        let payload = Bytes::from(serde_json::to_vec(&request).unwrap());

        transport.send(&Destination::Multicast, payload).await.unwrap();

        let sent = network.next_request().await.unwrap();
        assert_eq!(sent.destination, Destination::Multicast);
        assert_eq!(sent.request().unwrap(), request);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (transport, network) = MemoryTransport::new();
        network.fail_next_sends(2);

        assert!(transport.send(&Destination::Multicast, Bytes::new()).await.is_err());
        assert!(transport.send(&Destination::Multicast, Bytes::new()).await.is_err());
        assert!(transport.send(&Destination::Multicast, Bytes::new()).await.is_ok());
        assert_eq!(network.send_attempts(), 3);
    }

    #[tokio::test]
    async fn test_injected_recv_error_is_transient() {
        let (transport, network) = MemoryTransport::new();
        network.fail_next_recv("link flap");
        network.deliver("coap://10.0.0.5", "{}");

        let err = transport.recv().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(transport.recv().await.unwrap().source, "coap://10.0.0.5");
    }

    #[tokio::test]
    async fn test_recv_closed_when_network_dropped() {
        let (transport, network) = MemoryTransport::new();
        network.deliver("coap://10.0.0.5", "{}");
        drop(network);

        let datagram = transport.recv().await.unwrap();
        assert_eq!(datagram.source, "coap://10.0.0.5");
        assert!(matches!(
            transport.recv().await,
            Err(DiscoveryError::TransportClosed)
        ));
    }
}
