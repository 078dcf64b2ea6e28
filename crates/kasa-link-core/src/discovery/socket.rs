//! Shared datagram socket setup.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Create the engine's datagram socket with broadcast enabled.
///
/// The same socket sends discovery bursts, unicast queries and actuation
/// commands, and receives every reply.
pub fn create_broadcast_socket(bind_addr: SocketAddr) -> Result<UdpSocket, std::io::Error> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&bind_addr.into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}
