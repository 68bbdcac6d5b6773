/// Default CoAP / OIC port
pub const DEFAULT_COAP_PORT: u16 = 5683;

/// OIC "all CoAP nodes" multicast group
pub const DEFAULT_MULTICAST_ADDRESS: &str = "224.0.1.187";

/// Scheme prefixed to the socket address of a reporting service
pub const SERVICE_SCHEME: &str = "coap";

pub const WELL_KNOWN_URI: &str = "/oc/core";
pub const DEVICE_URI: &str = "/oc/core/d";
pub const RESOURCE_TYPES_URI: &str = "/oc/core/d/type";

pub const MAX_URI_LENGTH: usize = 64;
pub const MAX_QUERY_LENGTH: usize = 64;

/// Upper bound for one encoded discovery response datagram
pub const MAX_RESPONSE_LENGTH: usize = 1024;
