//! Server network layer handling UDP communications and game loop coordination

use crate::game::ServerGame;
use log::{debug, error, info, warn};
use shared::{Channel, ControlMessage, LogSink, PlayerId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Control {
        message: ControlMessage,
        addr: SocketAddr,
    },
    Datagram {
        bytes: Vec<u8>,
        addr: SocketAddr,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { bytes: Vec<u8>, addr: SocketAddr },
}

/// Per-player view of the shared UDP socket.
///
/// Inbound datagrams are routed here by the main loop and drained by the game
/// on its next tick; outbound ones are queued for the sender task.
#[derive(Debug)]
pub struct ServerChannel {
    addr: SocketAddr,
    inbox: Vec<Vec<u8>>,
    outbox: mpsc::UnboundedSender<GameMessage>,
}

impl ServerChannel {
    pub fn new(addr: SocketAddr, outbox: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self {
            addr,
            inbox: Vec::new(),
            outbox,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn deliver(&mut self, bytes: Vec<u8>) {
        self.inbox.push(bytes);
    }
}

impl Channel for ServerChannel {
    fn send(&mut self, bytes: &[u8]) {
        let message = GameMessage::SendPacket {
            bytes: bytes.to_vec(),
            addr: self.addr,
        };
        if let Err(e) = self.outbox.send(message) {
            error!("Failed to queue packet for {}: {}", self.addr, e);
        }
    }

    fn recv(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inbox)
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    game: ServerGame<ServerChannel>,
    timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            game: ServerGame::new(max_clients),
            timeout,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.socket.local_addr()?)
    }

    /// Handle that can stop [`Server::run`] by sending `ServerMessage::Shutdown`.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game(&self) -> &ServerGame<ServerChannel> {
        &self.game
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 65536];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let bytes = &buffer[..len];
                        let message = match ControlMessage::decode(bytes) {
                            Some(message) => ServerMessage::Control { message, addr },
                            None => ServerMessage::Datagram {
                                bytes: bytes.to_vec(),
                                addr,
                            },
                        };
                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send datagram to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { bytes, addr } => {
                        if let Err(e) = socket.send_to(&bytes, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    fn send_control(&self, message: &ControlMessage, addr: SocketAddr) {
        match message.encode() {
            Ok(bytes) => {
                if let Err(e) = self.game_tx.send(GameMessage::SendPacket { bytes, addr }) {
                    error!("Failed to queue control message: {}", e);
                }
            }
            Err(e) => error!("Failed to encode control message: {}", e),
        }
    }

    fn find_player(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.game
            .registry()
            .find_by(|connection| connection.channel.addr() == addr)
    }

    /// Processes handshake traffic
    fn handle_control(&mut self, message: ControlMessage, addr: SocketAddr) {
        match message {
            ControlMessage::Connect { client_version } => {
                info!("Client connecting from {} (version: {})", addr, client_version);

                if client_version != PROTOCOL_VERSION {
                    warn!("Rejecting {}: protocol version {}", addr, client_version);
                    let response = ControlMessage::Disconnected {
                        reason: format!(
                            "Protocol version mismatch: server speaks {}",
                            PROTOCOL_VERSION
                        ),
                    };
                    self.send_control(&response, addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = self.find_player(addr) {
                    info!("Removing existing player {} from {}", existing_id, addr);
                    self.game.remove_player(existing_id);
                }

                let channel = ServerChannel::new(addr, self.game_tx.clone());
                let response = match self.game.add_player(channel) {
                    Some(player_id) => ControlMessage::Connected { player_id },
                    None => ControlMessage::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_control(&response, addr);
            }

            ControlMessage::Disconnect => {
                if let Some(player_id) = self.find_player(addr) {
                    self.game.remove_player(player_id);
                }
            }

            other => {
                warn!("Unexpected control message from {}: {:?}", addr, other);
            }
        }
    }

    fn route_datagram(&mut self, bytes: Vec<u8>, addr: SocketAddr) {
        match self.find_player(addr) {
            Some(player_id) => {
                if let Some(connection) = self.game.registry_mut().get_mut(player_id) {
                    connection.channel.deliver(bytes);
                }
            }
            None => debug!("Ignoring {} bytes from unknown address {}", bytes.len(), addr),
        }
    }

    fn remove_timed_out(&mut self) {
        for player_id in self.game.registry().timed_out(self.timeout) {
            info!("Player {} timed out", player_id);
            if let Some(connection) = self.game.remove_player(player_id) {
                let response = ControlMessage::Disconnected {
                    reason: "Timed out".to_string(),
                };
                self.send_control(&response, connection.channel.addr());
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut frame_interval = interval(Duration::from_millis(1));
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timeout_interval = interval(Duration::from_secs(1));
        let mut last_frame = Instant::now();
        let mut sink = LogSink::new("server");

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Control { message, addr }) => {
                            self.handle_control(message, addr);
                        },
                        Some(ServerMessage::Datagram { bytes, addr }) => {
                            self.route_datagram(bytes, addr);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    let now = Instant::now();
                    let delta_ms = now.duration_since(last_frame).as_secs_f64() * 1000.0;
                    last_frame = now;
                    self.game.frame(delta_ms, &mut sink);
                },

                _ = timeout_interval.tick() => {
                    self.remove_timed_out();
                },
            }
        }

        Ok(())
    }
}
