use crate::config::{CancellationPolicy, EmptyResultPolicy, EngineConfig};
use crate::core::{SessionEntry, SessionRegistry};
use crate::discovery::dispatcher::dispatch;
use crate::discovery::notifier::{ChannelNotifier, NotificationReceiver};
use crate::discovery::traits::{
    Datagram, Destination, DiscoveryNotifier, Transport, pause_after_recv_error,
};
use crate::error::{DiscoveryError, Result};
use crate::protocol::{
    DiscoveryQuery, DiscoveryRequest, DiscoveryResponse, ResourceDescriptor, SessionId,
    validate_query, validate_resource,
};
use bytes::Bytes;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Handle to a started discovery session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Runs discovery sessions over a [`Transport`] and reports them to notifiers.
///
/// Each session gets a driver task (send with retries, then wait out the
/// discovery window) and a dispatcher task (delivers callbacks in order). A
/// single receive loop routes responses to sessions by token.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    transport: Arc<dyn Transport>,
    registry: SessionRegistry,
    config: EngineConfig,
    shutdown: CancellationToken,
}

impl DiscoveryEngine {
    /// Create an engine and start its receive loop. Must be called within a
    /// tokio runtime.
    pub fn new(transport: impl Transport, config: EngineConfig) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let shutdown = CancellationToken::new();

        let inner = Arc::new(EngineInner {
            transport: transport.clone(),
            registry: SessionRegistry::new(),
            config,
            shutdown: shutdown.clone(),
        });

        tokio::spawn(receive_loop(Arc::downgrade(&inner), transport, shutdown));

        Self { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Register `notifier` for a new session and start discovering.
    ///
    /// Returns immediately; results arrive on the notifier from engine tasks.
    pub fn start_discovery(
        &self,
        query: DiscoveryQuery,
        notifier: Arc<dyn DiscoveryNotifier>,
    ) -> Result<SessionHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(DiscoveryError::EngineShutdown);
        }
        validate_query(&query)?;

        Ok(self.launch(query, notifier))
    }

    /// Register a validated session and spawn its driver and dispatcher.
    ///
    /// May race with [`shutdown`](Self::shutdown); the driver then fails the
    /// session with [`DiscoveryError::EngineShutdown`].
    fn launch(&self, query: DiscoveryQuery, notifier: Arc<dyn DiscoveryNotifier>) -> SessionHandle {
        let id = SessionId::new();
        let (entry, queue) = SessionEntry::new(id, query, self.inner.shutdown.child_token());
        self.inner.registry.register(entry.clone());

        tokio::spawn(dispatch(queue, notifier));
        tokio::spawn(drive(self.inner.clone(), entry));

        tracing::info!("Session {} started", id);
        SessionHandle { id }
    }

    /// Start a session whose notifications arrive on a channel
    pub fn discover(&self, query: DiscoveryQuery) -> Result<(SessionHandle, NotificationReceiver)> {
        let (notifier, receiver) = ChannelNotifier::new();
        let handle = self.start_discovery(query, Arc::new(notifier))?;
        Ok((handle, receiver))
    }

    /// Cancel an active session.
    ///
    /// Pending results are discarded. Under [`CancellationPolicy::Notify`] the
    /// notifier receives `on_failed(Cancelled)`; under `Silent` it receives
    /// nothing more.
    pub fn cancel_discovery(&self, handle: &SessionHandle) -> Result<()> {
        let entry = self.inner.registry.remove(&handle.id).ok_or_else(|| {
            DiscoveryError::SessionNotFound {
                session_id: handle.id.to_string(),
            }
        })?;
        entry.cancel_token().cancel();

        let result = match self.inner.config.cancellation {
            CancellationPolicy::Notify => entry.fail(DiscoveryError::Cancelled),
            CancellationPolicy::Silent => entry.release(),
        };
        match result {
            Ok(()) => tracing::info!("Session {} cancelled", handle.id),
            Err(e) => reject(handle.id, e),
        }
        Ok(())
    }

    pub fn is_active(&self, handle: &SessionHandle) -> bool {
        self.inner.registry.contains(&handle.id)
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.registry.len()
    }

    /// Stop the receive loop and fail every active session with
    /// [`DiscoveryError::EngineShutdown`].
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();

        for entry in self.inner.registry.drain() {
            if let Err(e) = entry.fail(DiscoveryError::EngineShutdown) {
                reject(entry.id(), e);
            }
        }
        tracing::info!("Discovery engine shut down");
    }
}

impl EngineInner {
    async fn send_request(&self, entry: &SessionEntry) -> Result<()> {
        let id = entry.id();
        let request = DiscoveryRequest::new(id, entry.query());
        let payload = Bytes::from(serde_json::to_vec(&request)?);
        let destination = match entry.query().host {
            Some(ref host) => Destination::Host(host.clone()),
            None => Destination::Multicast,
        };

        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.transport.send(&destination, payload.clone()).await {
                Ok(()) => {
                    tracing::debug!("Session {}: request sent to {:?}", id, destination);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        "Session {}: send attempt {}/{} failed: {}",
                        id,
                        attempt,
                        max_attempts,
                        e
                    );
                    tokio::select! {
                        _ = entry.cancel_token().cancelled() => return Err(DiscoveryError::Cancelled),
                        _ = tokio::time::sleep(retry.backoff(attempt)) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decide how a session whose window elapsed terminates
    fn window_outcome(&self, entry: &SessionEntry) -> Result<()> {
        if entry.responses() > 0 {
            return Ok(());
        }

        if let Some(malformed) = entry.take_malformed() {
            return Err(malformed);
        }

        match self.config.empty_result {
            EmptyResultPolicy::Complete => Ok(()),
            EmptyResultPolicy::Fail => Err(DiscoveryError::Timeout),
        }
    }

    /// Deliver the terminal notification, unless a cancel or shutdown already did
    fn finish(&self, entry: &SessionEntry, outcome: Result<()>) {
        let id = entry.id();
        if self.registry.remove(&id).is_none() {
            return;
        }

        let result = match outcome {
            Ok(()) => entry.complete(),
            Err(e) => {
                tracing::warn!("Session {} failed: {}", id, e);
                entry.fail(e)
            }
        };

        match result {
            Ok(()) => tracing::info!(
                "Session {} finished after {:?} ({} batch(es), {} malformed)",
                id,
                entry.age(),
                entry.batches(),
                entry.malformed()
            ),
            Err(e) => reject(id, e),
        }
    }

    fn route(&self, datagram: Datagram) {
        let Datagram { source, payload } = datagram;

        let value: serde_json::Value = match serde_json::from_slice(&payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Discarding undecodable datagram from {}: {}", source, e);
                return;
            }
        };

        let token = match value
            .get("token")
            .cloned()
            .map(serde_json::from_value::<SessionId>)
        {
            Some(Ok(token)) => token,
            _ => {
                tracing::debug!("Discarding datagram without session token from {}", source);
                return;
            }
        };

        let Some(entry) = self.registry.lookup(&token) else {
            tracing::debug!("No active session {} for response from {}", token, source);
            return;
        };

        let resources = match decode_resources(&source, value) {
            Ok(resources) => resources,
            Err(e) => {
                tracing::debug!("Session {}: {}", token, e);
                entry.note_malformed(e);
                return;
            }
        };
        entry.note_response();

        let resources: Vec<ResourceDescriptor> = resources
            .into_iter()
            .filter(|r| entry.query().filter.matches_descriptor(r))
            .collect();
        if resources.is_empty() {
            tracing::debug!("Session {}: nothing matching from {}", token, source);
            return;
        }

        if let Err(e) = entry.report(source, resources) {
            reject(token, e);
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn decode_resources(source: &str, value: serde_json::Value) -> Result<Vec<ResourceDescriptor>> {
    let response: DiscoveryResponse = serde_json::from_value(value)
        .map_err(|e| DiscoveryError::malformed(source, e.to_string()))?;

    response
        .oc
        .into_iter()
        .map(|wire| {
            let descriptor = ResourceDescriptor::from_wire(source, wire);
            validate_resource(&descriptor)
                .map_err(|e| DiscoveryError::malformed(source, e.to_string()))?;
            Ok(descriptor)
        })
        .collect()
}

/// A notification the state gate refused; never forwarded to the consumer
fn reject(id: SessionId, error: DiscoveryError) {
    tracing::warn!("Session {}: rejected notification: {}", id, error);
}

async fn drive(inner: Arc<EngineInner>, entry: Arc<SessionEntry>) {
    let cancel = entry.cancel_token().clone();

    // Cancelled while still registered: launched after shutdown drained the
    // registry. `finish` skips sessions a cancel or shutdown already removed.
    if let Err(e) = inner.send_request(&entry).await {
        let cause = if cancel.is_cancelled() {
            DiscoveryError::EngineShutdown
        } else {
            e
        };
        inner.finish(&entry, Err(cause));
        return;
    }

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(DiscoveryError::EngineShutdown),
        _ = tokio::time::sleep(inner.config.discovery_window()) => inner.window_outcome(&entry),
    };
    inner.finish(&entry, outcome);
}

async fn receive_loop(
    engine: Weak<EngineInner>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = transport.recv() => received,
        };

        match received {
            Ok(datagram) => match engine.upgrade() {
                Some(inner) => inner.route(datagram),
                None => break,
            },
            Err(DiscoveryError::TransportClosed) => {
                tracing::debug!("Transport closed; receive loop exiting");
                break;
            }
            Err(e) => {
                tracing::warn!("Receive error: {}", e);
                if !pause_after_recv_error(&shutdown).await {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::discovery::memory::MemoryTransport;
    use crate::discovery::notifier::{DiscoveryEvent, DiscoveryOutcome};
    use crate::protocol::{WireProperties, WireResource};
    use std::time::Duration;

    fn fast_config() -> EngineConfig {
        EngineConfig::default()
            .with_discovery_window(Duration::from_millis(150))
            .with_retry(RetryPolicy {
                max_attempts: 3,
                backoff_ms: vec![5],
            })
    }

    fn wire(href: &str, rt: &str) -> WireResource {
        WireResource {
            href: href.to_string(),
            prop: WireProperties {
                rt: vec![rt.to_string()],
                interfaces: vec!["core.rw".to_string()],
                obs: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_single_service_then_completed() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (handle, receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let request = network.next_request().await.unwrap().request().unwrap();
        assert_eq!(request.token, handle.id());

        network.respond("coap://10.0.0.5", request.token, vec![wire("/light/1", "core.light")]);

        let report = receiver.collect().await;
        assert_eq!(report.outcome, DiscoveryOutcome::Completed);
        assert_eq!(report.services.len(), 1);
        assert_eq!(report.services[0].address, "coap://10.0.0.5");
        assert_eq!(report.services[0].resources[0].href, "/light/1");
        assert!(!engine.is_active(&handle));
    }

    #[tokio::test]
    async fn test_client_side_filtering() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (_handle, receiver) = engine
            .discover(DiscoveryQuery::all().resource_type("core.light"))
            .unwrap();
        let request = network.next_request().await.unwrap().request().unwrap();
        assert_eq!(request.query.as_deref(), Some("rt=core.light"));

        network.respond(
            "coap://10.0.0.5",
            request.token,
            vec![wire("/light/1", "core.light"), wire("/fan/1", "core.fan")],
        );
        network.respond("coap://10.0.0.6", request.token, vec![wire("/fan/2", "core.fan")]);

        let report = receiver.collect().await;
        assert_eq!(report.outcome, DiscoveryOutcome::Completed);
        assert_eq!(report.resource_count(), 1);
        assert_eq!(report.services[0].resources[0].href, "/light/1");
    }

    #[tokio::test]
    async fn test_unicast_destination() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (handle, _receiver) = engine
            .discover(DiscoveryQuery::all().host("10.0.0.5:5683"))
            .unwrap();
        let sent = network.next_request().await.unwrap();
        assert_eq!(sent.destination, Destination::Host("10.0.0.5:5683".to_string()));
        engine.cancel_discovery(&handle).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_only_fails_session() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (_handle, mut receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let request = network.next_request().await.unwrap().request().unwrap();

        let bad = format!(r#"{{"token":"{}","oc":[{{"href":""}}]}}"#, request.token);
        network.deliver("coap://10.0.0.7", bad);
        network.deliver("coap://10.0.0.8", "not json at all");

        match receiver.recv().await {
            Some(DiscoveryEvent::Failed(DiscoveryError::MalformedResponse {
                service_address, ..
            })) => assert_eq!(service_address, "coap://10.0.0.7"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_absorbed_when_others_valid() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (_handle, receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let request = network.next_request().await.unwrap().request().unwrap();

        network.deliver(
            "coap://10.0.0.7",
            format!(r#"{{"token":"{}","oc":"nope"}}"#, request.token),
        );
        network.respond("coap://10.0.0.5", request.token, vec![wire("/light/1", "core.light")]);

        let report = receiver.collect().await;
        assert_eq!(report.outcome, DiscoveryOutcome::Completed);
        assert_eq!(report.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_policy_fail() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(
            transport,
            fast_config().with_empty_result(EmptyResultPolicy::Fail),
        );

        let (_handle, mut receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let _ = network.next_request().await;

        assert!(matches!(
            receiver.recv().await,
            Some(DiscoveryEvent::Failed(DiscoveryError::Timeout))
        ));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let (transport, network) = MemoryTransport::new();
        network.fail_next_sends(2);
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (_handle, receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let request = network.next_request().await.unwrap().request().unwrap();
        network.respond("coap://10.0.0.5", request.token, vec![wire("/light/1", "core.light")]);

        let report = receiver.collect().await;
        assert_eq!(report.outcome, DiscoveryOutcome::Completed);
        assert_eq!(network.send_attempts(), 3);
    }

    #[tokio::test]
    async fn test_cancel_unknown_session() {
        let (transport, _network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (handle, receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let report = receiver.collect().await;
        assert_eq!(report.outcome, DiscoveryOutcome::Completed);

        assert!(matches!(
            engine.cancel_discovery(&handle),
            Err(DiscoveryError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_fails_active_sessions() {
        let (transport, _network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(
            transport,
            EngineConfig::default().with_discovery_window(Duration::from_secs(30)),
        );

        let (_handle, mut receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        assert_eq!(engine.active_sessions(), 1);

        engine.shutdown();
        assert!(matches!(
            receiver.recv().await,
            Some(DiscoveryEvent::Failed(DiscoveryError::EngineShutdown))
        ));
        assert_eq!(engine.active_sessions(), 0);
        assert!(matches!(
            engine.discover(DiscoveryQuery::all()),
            Err(DiscoveryError::EngineShutdown)
        ));
    }

    #[tokio::test]
    async fn test_session_launched_after_shutdown_drain_still_terminates() {
        let (transport, _network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(
            transport,
            EngineConfig::default().with_discovery_window(Duration::from_secs(30)),
        );

        // Shutdown wins the race between the start check and registration
        engine.shutdown();
        let (notifier, mut receiver) = ChannelNotifier::new();
        let handle = engine.launch(DiscoveryQuery::all(), Arc::new(notifier));

        assert!(matches!(
            receiver.recv().await,
            Some(DiscoveryEvent::Failed(DiscoveryError::EngineShutdown))
        ));
        assert!(receiver.recv().await.is_none());
        assert!(!engine.is_active(&handle));
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_receive_error_absorbed() {
        let (transport, network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let (_handle, receiver) = engine.discover(DiscoveryQuery::all()).unwrap();
        let request = network.next_request().await.unwrap().request().unwrap();

        network.fail_next_recv("interface went down");
        network.respond("coap://10.0.0.5", request.token, vec![wire("/light/1", "core.light")]);

        let report = receiver.collect().await;
        assert_eq!(report.outcome, DiscoveryOutcome::Completed);
        assert_eq!(report.resource_count(), 1);
        assert_eq!(report.services[0].address, "coap://10.0.0.5");
    }

    #[tokio::test]
    async fn test_invalid_query_rejected_synchronously() {
        let (transport, _network) = MemoryTransport::new();
        let engine = DiscoveryEngine::new(transport, fast_config());

        let result = engine.discover(DiscoveryQuery::all().uri("relative"));
        assert!(matches!(result, Err(DiscoveryError::InvalidQuery { .. })));
        assert_eq!(engine.active_sessions(), 0);
    }
}
