//! Datagram transport capability.
//!
//! The handshake and dispatcher only need to send a datagram to an address
//! and receive the next datagram with its source. Both operations are
//! unreliable and unordered; callers own retransmission and timeouts.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Unreliable, unordered datagram send/receive.
pub trait DatagramTransport: Send + Sync + 'static {
    /// Send one datagram to `target`.
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Receive the next datagram into `buf`, returning its length and source.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    /// Local address the transport is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramTransport for UdpSocket {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send {
        UdpSocket::send_to(self, buf, target)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        UdpSocket::recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn echo_once<T: DatagramTransport>(transport: &T) -> io::Result<()> {
        let mut buf = [0u8; 64];
        let (len, src) = transport.recv_from(&mut buf).await?;
        transport.send_to(&buf[..len], src).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_udp_socket_transport() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = DatagramTransport::local_addr(&server).unwrap();

        DatagramTransport::send_to(&client, b"ping", server_addr)
            .await
            .unwrap();
        timeout(Duration::from_secs(5), echo_once(&server))
            .await
            .unwrap()
            .unwrap();

        let mut buf = [0u8; 64];
        let (len, src) = timeout(
            Duration::from_secs(5),
            DatagramTransport::recv_from(&client, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(src, server_addr);
    }
}
