use crate::error::{DiscoveryError, Result};
use crate::protocol::{
    DiscoveryQuery, MAX_QUERY_LENGTH, MAX_URI_LENGTH, ResourceDescriptor, WireResource,
};

fn validate_href(href: &str) -> Result<()> {
    if href.trim().is_empty() {
        return Err(DiscoveryError::invalid_resource("Resource href cannot be empty"));
    }

    if !href.starts_with('/') {
        return Err(DiscoveryError::invalid_resource(format!(
            "Resource href must be absolute: {}",
            href
        )));
    }

    if href.len() > MAX_URI_LENGTH {
        return Err(DiscoveryError::invalid_resource(format!(
            "Resource href exceeds {} bytes",
            MAX_URI_LENGTH
        )));
    }

    Ok(())
}

/// Validates a discovery query against the stack's URI and query limits
pub fn validate_query(query: &DiscoveryQuery) -> Result<()> {
    if !query.uri.starts_with('/') {
        return Err(DiscoveryError::invalid_query(format!(
            "Request URI must be absolute: {}",
            query.uri
        )));
    }

    if query.uri.len() > MAX_URI_LENGTH {
        return Err(DiscoveryError::invalid_query(format!(
            "Request URI exceeds {} bytes",
            MAX_URI_LENGTH
        )));
    }

    if let Some(q) = query.filter.to_query_string() {
        if q.len() > MAX_QUERY_LENGTH {
            return Err(DiscoveryError::invalid_query(format!(
                "Query exceeds {} bytes",
                MAX_QUERY_LENGTH
            )));
        }
    }

    if let Some(ref host) = query.host {
        host.parse::<std::net::SocketAddr>()?;
    }

    Ok(())
}

/// Validates a resource entry before it is hosted
pub fn validate_wire_resource(resource: &WireResource) -> Result<()> {
    validate_href(&resource.href)
}

/// Validates a descriptor decoded from a remote service before it is reported
pub fn validate_resource(resource: &ResourceDescriptor) -> Result<()> {
    validate_href(&resource.href)?;

    if resource.service_address.trim().is_empty() {
        return Err(DiscoveryError::invalid_resource(
            "Service address cannot be empty",
        ));
    }

    Ok(())
}
