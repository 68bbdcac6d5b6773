pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod server;
pub mod prelude;

pub use config::{CancellationPolicy, EmptyResultPolicy, EngineConfig, RetryPolicy};
pub use discovery::{
    ChannelNotifier, Datagram, Destination, DiscoveryEngine, DiscoveryEvent, DiscoveryNotifier,
    DiscoveryOutcome, DiscoveryReport, MemoryNetwork, MemoryTransport, NotificationReceiver,
    SessionHandle, Transport, UdpTransport, UdpTransportConfig,
};
pub use error::{DiscoveryError, Result};
pub use protocol::{
    DiscoveryQuery, QueryFilter, ResourceDescriptor, SessionId, DEFAULT_COAP_PORT,
    DEFAULT_MULTICAST_ADDRESS, WELL_KNOWN_URI,
};
pub use server::{LocalResource, ResourceResponder};

#[cfg(feature = "cli")]
pub mod cli;
