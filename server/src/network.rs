//! Server network layer handling TCP connections and the room event loop
//!
//! Connections are accepted on a dedicated task and every subsequent input
//! (decoded client events, connection closures) is funneled through a single
//! mpsc queue into [`Server::run`]. That loop is the one place room state is
//! touched, so Join, StartGame, DrawNumber, RestartGame and Disconnect can
//! never interleave their read-modify-write, and a Join can never race a
//! Disconnect for host assignment. Outgoing delivery happens on per-connection
//! writer tasks that only ever see cloned, already-built events.

use crate::connection::ConnectionManager;
use crate::room::{ConnId, Outcome, Room, RoomEvent};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{read_frame_bytes, write_frame, ClientEvent, ServerEvent, PROTOCOL_VERSION};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages funneled into the room event loop.
#[derive(Debug)]
pub enum ServerMessage {
    /// A freshly accepted socket, not yet registered.
    Accepted {
        stream: TcpStream,
        addr: SocketAddr,
    },
    /// A decoded event from a registered connection.
    EventReceived {
        conn_id: ConnId,
        event: ClientEvent,
    },
    /// The connection's socket closed or failed.
    ConnectionClosed { conn_id: ConnId },
}

/// Main server owning the room, the connection registry and the event queue.
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    room: Room,
    connections: ConnectionManager,
    rng: StdRng,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_connections: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            room: Room::new(),
            connections: ConnectionManager::new(max_connections),
            rng: StdRng::from_entropy(),
            server_tx,
            server_rx,
        })
    }

    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the accept task and processes the event queue until shutdown.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(listener) = self.listener.take() {
            self.spawn_accept_loop(listener);
        }

        info!("server started");

        while let Some(message) = self.server_rx.recv().await {
            self.handle_message(message);
        }

        Ok(())
    }

    /// Accepts sockets and hands them to the event loop for registration.
    fn spawn_accept_loop(&self, listener: TcpListener) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if server_tx
                            .send(ServerMessage::Accepted { stream, addr })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("failed to accept connection: {}", e);
                    }
                }
            }
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Accepted { stream, addr } => {
                self.handle_accept(stream, addr);
            }
            ServerMessage::EventReceived { conn_id, event } => {
                let room_event = match event {
                    ClientEvent::Join {
                        nickname,
                        protocol_version,
                    } => {
                        if protocol_version != PROTOCOL_VERSION {
                            warn!(
                                "connection {} announced protocol version {}, expected {}",
                                conn_id, protocol_version, PROTOCOL_VERSION
                            );
                            self.connections.unicast(
                                conn_id,
                                ServerEvent::Error {
                                    message: "unsupported protocol version".to_string(),
                                },
                            );
                            return;
                        }
                        RoomEvent::Join { conn_id, nickname }
                    }
                    ClientEvent::StartGame => RoomEvent::StartGame { conn_id },
                    ClientEvent::DrawNumber => RoomEvent::DrawNumber { conn_id },
                    ClientEvent::RestartGame => RoomEvent::RestartGame { conn_id },
                };
                let outcomes = self.room.apply(room_event, &mut self.rng);
                self.dispatch(outcomes);
            }
            ServerMessage::ConnectionClosed { conn_id } => {
                self.connections.unregister(&conn_id);
                let outcomes = self
                    .room
                    .apply(RoomEvent::Disconnect { conn_id }, &mut self.rng);
                self.dispatch(outcomes);
            }
        }
    }

    /// Registers a socket, sends the room snapshot, and spawns its reader
    /// and writer tasks. At capacity the socket gets an error frame and is
    /// dropped without registration.
    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

        let conn_id = match self.connections.register(addr, out_tx) {
            Some(conn_id) => conn_id,
            None => {
                warn!("rejecting connection from {}: server full", addr);
                tokio::spawn(async move {
                    let mut stream = stream;
                    let refusal = ServerEvent::Error {
                        message: "server is full".to_string(),
                    };
                    let _ = write_frame(&mut stream, &refusal).await;
                });
                return;
            }
        };

        let (mut read_half, mut write_half) = stream.into_split();

        // Writer task: drains the connection's outbound queue.
        tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &event).await {
                    warn!("write to connection {} failed: {}", conn_id, e);
                    break;
                }
            }
        });

        // The snapshot is queued before the reader task exists, so it always
        // precedes any reply to this connection's own events.
        self.connections.unicast(conn_id, self.room.snapshot());

        // Reader task: decodes frames into the event queue. An undecodable
        // body is dropped (the frame was consumed in full, the stream stays
        // aligned); a framing or socket error closes the connection.
        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            loop {
                match read_frame_bytes(&mut read_half).await {
                    Ok(body) => match bincode::deserialize::<ClientEvent>(&body) {
                        Ok(event) => {
                            if server_tx
                                .send(ServerMessage::EventReceived { conn_id, event })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("undecodable frame from connection {}: {}", conn_id, e);
                        }
                    },
                    Err(e) => {
                        if e.kind() != std::io::ErrorKind::UnexpectedEof {
                            warn!("connection {} read error: {}", conn_id, e);
                        }
                        let _ = server_tx.send(ServerMessage::ConnectionClosed { conn_id });
                        break;
                    }
                }
            }
        });
    }

    fn dispatch(&self, outcomes: Vec<Outcome>) {
        for outcome in outcomes {
            match outcome {
                Outcome::Unicast { conn_id, event } => self.connections.unicast(conn_id, event),
                Outcome::Broadcast { event } => self.connections.broadcast(event),
            }
        }
    }
}
