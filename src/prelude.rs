//! Prelude module for convenient imports
//!
//! Use `use oic_discovery::prelude::*;` to import commonly used types

// Engine and notifier contract
pub use crate::discovery::{
    ChannelNotifier, DiscoveryEngine, DiscoveryEvent, DiscoveryNotifier, DiscoveryOutcome,
    DiscoveryReport, NotificationReceiver, SessionHandle,
};

// Transports
pub use crate::discovery::{
    Datagram, Destination, MemoryNetwork, MemoryTransport, Transport, UdpTransport,
    UdpTransportConfig,
};

// Protocol types
pub use crate::protocol::{
    validate_query, validate_resource, DiscoveryQuery, QueryFilter, ResourceDescriptor,
    SessionId, DEFAULT_COAP_PORT, DEFAULT_MULTICAST_ADDRESS, WELL_KNOWN_URI,
};

// Configuration
pub use crate::config::{CancellationPolicy, EmptyResultPolicy, EngineConfig, RetryPolicy};

// Serving side
pub use crate::server::{LocalResource, ResourceResponder};

// Error handling
pub use crate::error::{DiscoveryError, Result};
