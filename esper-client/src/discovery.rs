//! Device discovery: broadcast one request, collect responses until the
//! deadline.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use esper_proto::discovery::{
    decode_response, encode_request, DiscoveryFilter, DiscoveryRequest, DiscoveryResponse,
    DISCOVERY_PORT,
};

/// Floor for the per-iteration receive timeout; zero is not a valid socket
/// timeout and a vanishing one would busy-spin at the deadline edge.
const MIN_RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// Largest datagram we accept; discovery packets fit in one MTU.
const RECV_BUF_LEN: usize = 1500;

/// Collects discovery responses from the LAN. Owns no socket between calls;
/// each broadcast binds, sends, listens, and releases on every exit path.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    target: SocketAddr,
}

impl DiscoveryClient {
    /// Broadcast to the whole LAN on the standard discovery port.
    pub fn new() -> Self {
        Self {
            target: SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT)),
        }
    }

    /// Aim at a specific address instead of the LAN broadcast (unicast
    /// probes, loopback tests).
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }

    /// Send one discovery request and gather every response that arrives
    /// before `timeout` elapses, in arrival order. Responders answer at most
    /// once by convention; no deduplication is applied. Datagrams that do not
    /// decode are skipped. An empty result after the full window is a normal
    /// outcome, not an error; only socket failures are.
    pub fn broadcast(
        &self,
        filter: &DiscoveryFilter,
        auth_token: &str,
        timeout: Duration,
    ) -> io::Result<Vec<DiscoveryResponse>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(true)?;

        let request = DiscoveryRequest::new(filter.clone(), auth_token);
        socket.send_to(&encode_request(&request), self.target)?;
        log::debug!(
            "discovery request {:#010x} sent to {}",
            request.message_id,
            self.target
        );

        let deadline = Instant::now() + timeout;
        let mut responses = Vec::new();
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline.duration_since(now).max(MIN_RECV_TIMEOUT);
            socket.set_read_timeout(Some(remaining))?;
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => match decode_response(&buf[..n]) {
                    Ok(resp) => {
                        log::debug!("discovery response from {} ({})", from, resp.name);
                        responses.push(resp);
                    }
                    Err(e) => log::debug!("ignoring datagram from {}: {}", from, e),
                },
                // Receive timeouts are the expected end of the window; loop
                // back and let the deadline check decide.
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}
