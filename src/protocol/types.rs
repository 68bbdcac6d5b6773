use crate::protocol::constants::WELL_KNOWN_URI;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one discovery session; doubles as the request token on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One discovered resource, as handed to a notifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub href: String,
    #[serde(rename = "serviceAddress")]
    pub service_address: String,
    #[serde(rename = "resourceTypes")]
    pub resource_types: Vec<String>,
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub observable: bool,
}

impl ResourceDescriptor {
    pub fn new(href: impl Into<String>, service_address: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            service_address: service_address.into(),
            resource_types: Vec::new(),
            interfaces: Vec::new(),
            observable: false,
        }
    }

    pub fn with_resource_type(mut self, rt: impl Into<String>) -> Self {
        self.resource_types.push(rt.into());
        self
    }

    pub fn with_interface(mut self, iface: impl Into<String>) -> Self {
        self.interfaces.push(iface.into());
        self
    }

    pub fn observable(mut self, observable: bool) -> Self {
        self.observable = observable;
        self
    }

    pub fn from_wire(service_address: &str, wire: WireResource) -> Self {
        Self {
            href: wire.href,
            service_address: service_address.to_string(),
            resource_types: wire.prop.rt,
            interfaces: wire.prop.interfaces,
            observable: wire.prop.obs != 0,
        }
    }
}

/// Resource-type / interface filter carried in the request query
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(rename = "resourceType")]
    pub resource_type: Option<String>,
    pub interface: Option<String>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self.resource_type.is_none() && self.interface.is_none()
    }

    /// Render as `rt=<type>&if=<interface>`, or `None` when unfiltered
    pub fn to_query_string(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(ref rt) = self.resource_type {
            parts.push(format!("rt={}", rt));
        }
        if let Some(ref iface) = self.interface {
            parts.push(format!("if={}", iface));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("&"))
        }
    }

    /// Parse a query string; unknown keys are ignored
    pub fn parse(query: &str) -> Self {
        let mut filter = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("rt", value)) if !value.is_empty() => {
                    filter.resource_type = Some(value.to_string())
                }
                Some(("if", value)) if !value.is_empty() => {
                    filter.interface = Some(value.to_string())
                }
                _ => {}
            }
        }
        filter
    }

    pub fn matches(&self, resource_types: &[String], interfaces: &[String]) -> bool {
        let rt_ok = self
            .resource_type
            .as_ref()
            .is_none_or(|rt| resource_types.iter().any(|t| t == rt));
        let if_ok = self
            .interface
            .as_ref()
            .is_none_or(|i| interfaces.iter().any(|t| t == i));
        rt_ok && if_ok
    }

    pub fn matches_descriptor(&self, resource: &ResourceDescriptor) -> bool {
        self.matches(&resource.resource_types, &resource.interfaces)
    }
}

/// Parameters of one discovery request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    pub uri: String,
    #[serde(default)]
    pub filter: QueryFilter,
    /// Unicast target (`ip:port`); multicast when absent
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self {
            uri: WELL_KNOWN_URI.to_string(),
            filter: QueryFilter::default(),
            host: None,
        }
    }
}

impl DiscoveryQuery {
    /// Query the well-known resource URI of every service on the multicast group
    pub fn all() -> Self {
        Self::default()
    }

    pub fn resource_type(mut self, rt: impl Into<String>) -> Self {
        self.filter.resource_type = Some(rt.into());
        self
    }

    pub fn interface(mut self, iface: impl Into<String>) -> Self {
        self.filter.interface = Some(iface.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub token: SessionId,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl DiscoveryRequest {
    pub fn new(token: SessionId, query: &DiscoveryQuery) -> Self {
        Self {
            token,
            uri: query.uri.clone(),
            query: query.filter.to_query_string(),
        }
    }

    pub fn filter(&self) -> QueryFilter {
        self.query
            .as_deref()
            .map(QueryFilter::parse)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub token: SessionId,
    pub oc: Vec<WireResource>,
}

/// `{"href":"/a/led","prop":{"rt":["core.led"],"if":["core.rw"],"obs":1}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResource {
    pub href: String,
    #[serde(default)]
    pub prop: WireProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProperties {
    #[serde(default)]
    pub rt: Vec<String>,
    #[serde(rename = "if", default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub obs: u8,
}
