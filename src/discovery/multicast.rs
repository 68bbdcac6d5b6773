use crate::discovery::traits::{Datagram, Destination, Transport};
use crate::error::{DiscoveryError, Result};
use crate::protocol::{DEFAULT_COAP_PORT, DEFAULT_MULTICAST_ADDRESS, SERVICE_SCHEME};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol as SocketProtocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

const READ_BUF_SIZE: usize = 65536;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UdpTransportConfig {
    pub group: Ipv4Addr,
    /// Port services listen on
    pub port: u16,
    /// Local port to bind; 0 picks an ephemeral port
    pub bind_port: u16,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_ADDRESS
                .parse()
                .unwrap_or(Ipv4Addr::new(224, 0, 1, 187)),
            port: DEFAULT_COAP_PORT,
            bind_port: 0,
            multicast_ttl: 1,
            multicast_loop: true,
        }
    }
}

impl UdpTransportConfig {
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

/// JSON-over-UDP transport sending discovery requests to the OIC multicast group
pub struct UdpTransport {
    socket: UdpSocket,
    group: SocketAddr,
}

impl UdpTransport {
    pub fn bind(config: &UdpTransportConfig) -> Result<Self> {
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.bind_port));
        let socket = create_reusable_udp_socket(&bind_addr)?;
        socket.set_multicast_ttl_v4(config.multicast_ttl)?;
        socket.set_multicast_loop_v4(config.multicast_loop)?;

        tracing::debug!(
            "UDP discovery transport bound to {:?}, group {}",
            socket.local_addr().ok(),
            config.group_addr()
        );

        Ok(Self {
            socket,
            group: config.group_addr(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn send(&self, destination: &Destination, payload: Bytes) -> Result<()> {
        let target = match destination {
            Destination::Multicast => self.group,
            Destination::Host(host) => host.parse::<SocketAddr>()?,
        };

        self.socket
            .send_to(&payload, target)
            .await
            .map_err(|e| DiscoveryError::transport(format!("Failed to send to {}: {}", target, e)))?;
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram> {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let (len, src) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);

        Ok(Datagram {
            source: service_address(&src),
            payload: Bytes::from(buf),
        })
    }
}

/// `coap://<ip>:<port>` for a responding socket address
pub fn service_address(addr: &SocketAddr) -> String {
    format!("{}://{}", SERVICE_SCHEME, addr)
}

/// Creates a UDP socket with port reuse enabled.
///
/// Services share the fixed CoAP port: several responders (and a discovery
/// client bound to that port) on one host must all be able to join the group.
pub(crate) fn create_reusable_udp_socket(bind_addr: &SocketAddr) -> Result<UdpSocket> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(SocketProtocol::UDP))
        .map_err(|e| DiscoveryError::transport(format!("Failed to create socket: {}", e)))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| DiscoveryError::transport(format!("Failed to set reuse_address: {}", e)))?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket
        .set_reuse_port(true)
        .map_err(|e| DiscoveryError::transport(format!("Failed to set reuse_port: {}", e)))?;

    socket.bind(&(*bind_addr).into()).map_err(|e| {
        DiscoveryError::transport(format!("Failed to bind to {}: {}", bind_addr, e))
    })?;

    let std_socket: std::net::UdpSocket = socket.into();
    std_socket
        .set_nonblocking(true)
        .map_err(|e| DiscoveryError::transport(format!("Failed to set non-blocking: {}", e)))?;

    UdpSocket::from_std(std_socket).map_err(|e| {
        DiscoveryError::transport(format!("Failed to convert to tokio socket: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_oic_group() {
        let config = UdpTransportConfig::default();
        assert_eq!(config.group_addr().to_string(), "224.0.1.187:5683");
        assert_eq!(config.bind_port, 0);
    }

    #[test]
    fn test_service_address_format() {
        let addr: SocketAddr = "10.0.0.5:5683".parse().unwrap();
        assert_eq!(service_address(&addr), "coap://10.0.0.5:5683");
    }

    #[tokio::test]
    async fn test_unicast_loopback() {
        let a = UdpTransport::bind(&UdpTransportConfig::default()).unwrap();
        let b = UdpTransport::bind(&UdpTransportConfig::default()).unwrap();
        let b_port = b.local_addr().unwrap().port();

        a.send(
            &Destination::Host(format!("127.0.0.1:{}", b_port)),
            Bytes::from_static(b"{\"token\":null}"),
        )
        .await
        .unwrap();

        let datagram = b.recv().await.unwrap();
        assert!(datagram.source.starts_with("coap://127.0.0.1:"));
        assert_eq!(&datagram.payload[..], b"{\"token\":null}");
    }

    #[tokio::test]
    async fn test_unparseable_host() {
        let transport = UdpTransport::bind(&UdpTransportConfig::default()).unwrap();
        let err = transport
            .send(&Destination::Host("nowhere".to_string()), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::AddrParse { .. }));
    }
}
