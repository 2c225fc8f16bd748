//! Local port liveness probes.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;

/// How long a single connect attempt may take before the port counts as closed.
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// True when something on the loopback interface accepts connections on `port`.
pub async fn is_port_listening(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Probes every port concurrently and returns those that are listening, in
/// the order given.
pub async fn listening_ports(ports: &[u16]) -> Vec<u16> {
    let probes = ports.iter().map(|&port| async move { (port, is_port_listening(port).await) });
    let mut handles = Vec::with_capacity(ports.len());
    for probe in probes {
        handles.push(tokio::spawn(probe));
    }

    let mut open = Vec::new();
    for handle in handles {
        if let Ok((port, true)) = handle.await {
            open.push(port);
        }
    }
    open
}
