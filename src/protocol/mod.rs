pub mod constants;
pub mod types;
pub mod validation;

pub use constants::{
    DEFAULT_COAP_PORT, DEFAULT_MULTICAST_ADDRESS, DEVICE_URI, MAX_QUERY_LENGTH,
    MAX_RESPONSE_LENGTH, MAX_URI_LENGTH, RESOURCE_TYPES_URI, SERVICE_SCHEME, WELL_KNOWN_URI,
};
pub use types::{
    DiscoveryQuery, DiscoveryRequest, DiscoveryResponse, QueryFilter, ResourceDescriptor,
    SessionId, WireProperties, WireResource,
};
pub use validation::{validate_query, validate_resource, validate_wire_resource};
