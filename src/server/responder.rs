use crate::discovery::multicast::{UdpTransportConfig, create_reusable_udp_socket};
use crate::discovery::traits::pause_after_recv_error;
use crate::error::{DiscoveryError, Result};
use crate::protocol::{
    DEVICE_URI, DiscoveryRequest, DiscoveryResponse, MAX_RESPONSE_LENGTH, RESOURCE_TYPES_URI,
    SessionId, WELL_KNOWN_URI, WireProperties, WireResource, validate_wire_resource,
};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A resource hosted by this process and advertised to discovery requests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalResource {
    pub href: String,
    pub resource_types: Vec<String>,
    pub interfaces: Vec<String>,
    #[serde(default = "default_true")]
    pub discoverable: bool,
    #[serde(default)]
    pub observable: bool,
}

fn default_true() -> bool {
    true
}

impl LocalResource {
    pub fn new(
        href: impl Into<String>,
        resource_type: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            href: href.into(),
            resource_types: vec![resource_type.into()],
            interfaces: vec![interface.into()],
            discoverable: true,
            observable: false,
        }
    }

    pub fn observable(mut self, observable: bool) -> Self {
        self.observable = observable;
        self
    }

    pub fn discoverable(mut self, discoverable: bool) -> Self {
        self.discoverable = discoverable;
        self
    }

    pub fn to_wire(&self) -> WireResource {
        WireResource {
            href: self.href.clone(),
            prop: WireProperties {
                rt: self.resource_types.clone(),
                interfaces: self.interfaces.clone(),
                obs: u8::from(self.observable),
            },
        }
    }
}

/// Ordered set of hosted resources; answers discovery requests
#[derive(Default)]
pub struct ResourceTable {
    resources: RwLock<Vec<LocalResource>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, replacing any existing one with the same href
    pub fn add(&self, resource: LocalResource) -> Result<()> {
        validate_wire_resource(&resource.to_wire())?;

        let mut resources = self.resources.write();
        match resources.iter_mut().find(|r| r.href == resource.href) {
            Some(existing) => *existing = resource,
            None => resources.push(resource),
        }
        Ok(())
    }

    pub fn remove(&self, href: &str) -> bool {
        let mut resources = self.resources.write();
        let before = resources.len();
        resources.retain(|r| r.href != href);
        resources.len() != before
    }

    pub fn list(&self) -> Vec<LocalResource> {
        self.resources.read().clone()
    }

    /// Build the reply datagrams for a raw discovery request.
    ///
    /// Requests for other URIs, or matching no discoverable resource, get no reply.
    pub fn handle_request(&self, payload: &[u8]) -> Result<Vec<Bytes>> {
        let request: DiscoveryRequest = serde_json::from_slice(payload)?;
        match request.uri.as_str() {
            WELL_KNOWN_URI => {}
            DEVICE_URI | RESOURCE_TYPES_URI => {
                tracing::debug!("Device queries are not served: {}", request.uri);
                return Ok(Vec::new());
            }
            _ => {
                tracing::debug!("Ignoring request for {}", request.uri);
                return Ok(Vec::new());
            }
        }

        let filter = request.filter();
        let matching: Vec<WireResource> = self
            .resources
            .read()
            .iter()
            .filter(|r| r.discoverable && filter.matches(&r.resource_types, &r.interfaces))
            .map(LocalResource::to_wire)
            .collect();

        if matching.is_empty() {
            return Ok(Vec::new());
        }
        encode_responses(request.token, matching)
    }
}

/// Split a resource list into response datagrams of at most
/// [`MAX_RESPONSE_LENGTH`] bytes each. A single resource too large for the
/// limit is still sent on its own.
pub fn encode_responses(token: SessionId, resources: Vec<WireResource>) -> Result<Vec<Bytes>> {
    let mut datagrams = Vec::new();
    let mut current = DiscoveryResponse {
        token,
        oc: Vec::new(),
    };
    let mut encoded: Option<Vec<u8>> = None;

    for resource in resources {
        current.oc.push(resource);
        let candidate = serde_json::to_vec(&current)?;

        if candidate.len() > MAX_RESPONSE_LENGTH && current.oc.len() > 1 {
            let overflow = current.oc.pop();
            if let Some(full) = encoded.take() {
                datagrams.push(Bytes::from(full));
            }
            current.oc = overflow.into_iter().collect();
            encoded = Some(serde_json::to_vec(&current)?);
        } else {
            encoded = Some(candidate);
        }
    }

    if let Some(last) = encoded {
        datagrams.push(Bytes::from(last));
    }
    Ok(datagrams)
}

/// Answers discovery requests arriving on the OIC multicast group
pub struct ResourceResponder {
    table: Arc<ResourceTable>,
    config: UdpTransportConfig,
    handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl ResourceResponder {
    pub fn new(config: UdpTransportConfig) -> Self {
        Self {
            table: Arc::new(ResourceTable::new()),
            config,
            handle: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn table(&self) -> &Arc<ResourceTable> {
        &self.table
    }

    pub fn add_resource(&self, resource: LocalResource) -> Result<()> {
        self.table.add(resource)
    }

    /// Bind the service port, join the discovery group and start answering.
    ///
    /// Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.handle.is_some() {
            return Err(DiscoveryError::invalid_state("Responder already running"));
        }

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.port));
        let socket = create_reusable_udp_socket(&bind_addr)?;
        if let Err(e) = socket.join_multicast_v4(self.config.group, Ipv4Addr::UNSPECIFIED) {
            // Unicast requests are still answered
            tracing::warn!("Failed to join {}: {}", self.config.group, e);
        }
        let local_addr = socket.local_addr()?;

        let table = self.table.clone();
        let shutdown = self.shutdown.clone();

        self.handle = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];

            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = socket.recv_from(&mut buf) => received,
                };

                let (len, src) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::debug!("Responder receive error: {}", e);
                        if pause_after_recv_error(&shutdown).await {
                            continue;
                        }
                        break;
                    }
                };

                let replies = match table.handle_request(&buf[..len]) {
                    Ok(replies) => replies,
                    Err(e) => {
                        tracing::debug!("Discarding request from {}: {}", src, e);
                        continue;
                    }
                };

                for reply in replies {
                    if let Err(e) = socket.send_to(&reply, src).await {
                        tracing::debug!("Failed to reply to {}: {}", src, e);
                    }
                }
            }
        }));

        tracing::info!("Resource responder listening on {}", local_addr);
        Ok(local_addr)
    }

    pub fn stop(&mut self) {
        self.shutdown.cancel();
        self.shutdown = CancellationToken::new();
        self.handle = None;
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ResourceResponder {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
