//! Client networking: UDP handshake and the non-blocking game channel

use log::{debug, info, warn};
use shared::{Channel, ControlMessage, PlayerId, PROTOCOL_VERSION};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Non-blocking UDP channel to the server.
///
/// Polled from the frame loop, so it never waits: `recv` returns whatever the
/// OS has buffered since the previous call.
#[derive(Debug)]
pub struct UdpChannel {
    socket: std::net::UdpSocket,
    server: SocketAddr,
    buffer: Vec<u8>,
    closed: bool,
}

impl UdpChannel {
    pub fn new(socket: std::net::UdpSocket, server: SocketAddr) -> std::io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            server,
            buffer: vec![0u8; 65536],
            closed: false,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// True once the server has told us we are no longer connected.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn disconnect(&mut self) {
        if let Ok(bytes) = ControlMessage::Disconnect.encode() {
            self.send(&bytes);
        }
        self.closed = true;
    }
}

impl Channel for UdpChannel {
    fn send(&mut self, bytes: &[u8]) {
        if let Err(e) = self.socket.send_to(bytes, self.server) {
            if e.kind() != ErrorKind::WouldBlock {
                warn!("Failed to send to {}: {}", self.server, e);
            }
        }
    }

    fn recv(&mut self) -> Vec<Vec<u8>> {
        let mut received = Vec::new();
        loop {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, from)) => {
                    if from != self.server {
                        continue;
                    }
                    let bytes = &self.buffer[..len];
                    match ControlMessage::decode(bytes) {
                        Some(ControlMessage::Disconnected { reason }) => {
                            warn!("Disconnected by server: {}", reason);
                            self.closed = true;
                        }
                        Some(other) => debug!("Ignoring control message {:?}", other),
                        None => received.push(bytes.to_vec()),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("Receive error from {}: {}", self.server, e);
                    break;
                }
            }
        }
        received
    }
}

/// Performs the handshake, retrying `attempts` times with `timeout` each.
pub async fn connect(
    server: &str,
    attempts: u32,
    timeout: Duration,
) -> Result<(PlayerId, UdpChannel), Box<dyn std::error::Error>> {
    let server_addr = tokio::net::lookup_host(server)
        .await?
        .next()
        .ok_or("Could not resolve server address")?;
    let bind_addr = if server_addr.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    let request = ControlMessage::Connect {
        client_version: PROTOCOL_VERSION,
    }
    .encode()?;
    let mut buffer = vec![0u8; 65536];

    for attempt in 1..=attempts {
        info!(
            "Connecting to {} (attempt {}/{})",
            server_addr, attempt, attempts
        );
        socket.send_to(&request, server_addr).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (len, from) =
                match tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await {
                    Ok(result) => result?,
                    Err(_) => break,
                };
            if from != server_addr {
                continue;
            }

            match ControlMessage::decode(&buffer[..len]) {
                Some(ControlMessage::Connected { player_id }) => {
                    info!("Connected! Player ID: {}", player_id);
                    let channel = UdpChannel::new(socket.into_std()?, server_addr)?;
                    return Ok((player_id, channel));
                }
                Some(ControlMessage::Disconnected { reason }) => {
                    return Err(format!("Connection refused: {}", reason).into());
                }
                _ => continue,
            }
        }
    }

    Err(format!("No response from {} after {} attempts", server_addr, attempts).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_server(reply: ControlMessage) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];
            let (len, from) = socket.recv_from(&mut buffer).await.unwrap();
            assert_eq!(
                ControlMessage::decode(&buffer[..len]),
                Some(ControlMessage::Connect {
                    client_version: PROTOCOL_VERSION
                })
            );
            socket
                .send_to(&reply.encode().unwrap(), from)
                .await
                .unwrap();
            socket.send_to(b"[2]", from).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_connect_returns_player_id() {
        let addr = fake_server(ControlMessage::Connected { player_id: 7 }).await;
        let (player_id, mut channel) =
            tokio_test::assert_ok!(connect(&addr.to_string(), 3, Duration::from_millis(500)).await);
        assert_eq!(player_id, 7);
        assert_eq!(channel.server(), addr);

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(channel.recv());
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(received, vec![b"[2]".to_vec()]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let addr = fake_server(ControlMessage::Disconnected {
            reason: "Server full".to_string(),
        })
        .await;
        let result = connect(&addr.to_string(), 1, Duration::from_millis(500)).await;
        let message = result.err().unwrap().to_string();
        assert!(message.contains("Server full"));
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let result = connect(&addr.to_string(), 2, Duration::from_millis(50)).await;
        tokio_test::assert_err!(result);
    }

    #[test]
    fn test_disconnected_message_closes_channel() {
        let server = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let client_addr = client.local_addr().unwrap();
        let mut channel = UdpChannel::new(client, server.local_addr().unwrap()).unwrap();

        let bye = ControlMessage::Disconnected {
            reason: "Timed out".to_string(),
        };
        server.send_to(b"[4]", client_addr).unwrap();
        server.send_to(&bye.encode().unwrap(), client_addr).unwrap();

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(channel.recv());
            if channel.is_closed() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(channel.is_closed());
        assert_eq!(received, vec![b"[4]".to_vec()]);
    }
}
