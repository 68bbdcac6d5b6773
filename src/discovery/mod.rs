mod dispatcher;
pub mod engine;
pub mod memory;
pub mod multicast;
pub mod notifier;
pub mod traits;

pub use engine::{DiscoveryEngine, SessionHandle};
pub use memory::{MemoryNetwork, MemoryTransport, SentRequest};
pub use multicast::{UdpTransport, UdpTransportConfig};
pub use notifier::{
    ChannelNotifier, DiscoveryEvent, DiscoveryOutcome, DiscoveryReport, NotificationReceiver,
    ServiceResources,
};
pub use traits::{Datagram, Destination, DiscoveryNotifier, Transport};
