//! Server network layer handling UDP communications and game loop coordination

use crate::error::ServerError;
use crate::game::GameState;
use crate::listing::{ListingInfo, ServerListing};
use crate::session::Outcome;
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Largest datagram the server reads
const MAX_DATAGRAM: usize = 4096;

/// How long a closing server keeps answering clients
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived { data: Vec<u8>, addr: SocketAddr },
    /// The socket can no longer receive; the server shuts down at once
    TransportFailed(String),
    Shutdown { immediate: bool },
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendDatagram { data: Vec<u8>, addr: SocketAddr },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    state: GameState,
    listing: Box<dyn ServerListing>,
    listed: Option<ListingInfo>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        state: GameState,
        listing: Box<dyn ServerListing>,
    ) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            state,
            listing,
            listed: None,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender for injecting control messages, e.g. a shutdown request.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let data = buffer[..len].to_vec();
                        if let Err(e) = server_tx.send(ServerMessage::DatagramReceived { data, addr })
                        {
                            debug!("Main loop gone, stopping receiver: {}", e);
                            break;
                        }
                    }
                    // ICMP port unreachable from a departed client on some platforms
                    Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                        warn!("Ignoring connection reset: {}", e);
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        let _ = server_tx.send(ServerMessage::TransportFailed(e.to_string()));
                        break;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing datagram queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendDatagram { data, addr } => {
                        if let Err(e) = socket.send_to(&data, addr).await {
                            error!("Failed to send datagram to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    fn send_datagram(&self, data: Vec<u8>, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendDatagram { data, addr }) {
            error!("Failed to queue datagram for sending: {}", e);
        }
    }

    /// Runs one datagram through the session handler and routes the outcome
    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        match self.state.handle_datagram(data, Instant::now()) {
            Outcome::Reply(reply) => self.send_datagram(reply, addr),
            Outcome::Register(payload) => self.listing.on_register_packet(&payload),
            Outcome::Ignore => {}
        }
    }

    fn listing_info(&self) -> ListingInfo {
        ListingInfo {
            name: self.state.config.server_name.clone(),
            map: self.state.map.name().to_string(),
            players: self.state.player_count,
            bots: self.state.active_bot_count() as u32,
            max_players: self.state.max_players,
        }
    }

    /// Pushes the listing entry whenever anything on it changed
    fn sync_listing(&mut self) {
        let info = self.listing_info();
        if self.listed.as_ref() != Some(&info) {
            self.listing.update(&info);
            self.listed = Some(info);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.sync_listing();

        let mut tick_interval = interval(self.state.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Server started successfully ({} updates per second, map {})",
            self.state.config.updates_per_sec,
            self.state.map.name()
        );

        let immediate = loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { data, addr }) => {
                            self.handle_datagram(&data, addr);
                        },
                        Some(ServerMessage::TransportFailed(reason)) => {
                            error!("Network transport failed: {}", reason);
                            break true;
                        },
                        Some(ServerMessage::Shutdown { immediate }) => break immediate,
                        None => break true,
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.state.tick(Instant::now());
                    self.sync_listing();
                },
            }
        };

        self.shutdown(immediate).await;
        Ok(())
    }

    /// Stops the simulation and keeps telling clients the server is closing
    /// until the grace period ends.
    async fn shutdown(&mut self, immediate: bool) {
        info!("Server going down");
        self.state.session.closing = true;

        if self.listing.is_registered() {
            self.listing.deregister();
        }

        let grace = if immediate {
            Duration::ZERO
        } else {
            SHUTDOWN_GRACE
        };
        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { data, addr }) => {
                            self.handle_datagram(&data, addr);
                        },
                        Some(_) => {},
                        None => break,
                    }
                },
            }
        }

        // Let the sender flush the last replies
        tokio::task::yield_now().await;
        info!("Server closed");
    }
}
