//! Connection registry and message dispatch for the bingo server
//!
//! This module handles the server-side bookkeeping of live connections:
//! - Connection lifecycle (register on accept, unregister on close)
//! - Capacity enforcement for new connections
//! - Unicast and broadcast delivery of server events
//!
//! Registering a connection does not create a player; a connection only
//! becomes a player when the room accepts its Join event. Broadcasts
//! therefore reach every registered connection, including spectating ones
//! that never joined.

use log::{info, warn};
use shared::ServerEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::room::ConnId;

/// A live connection and the channel used to reach its writer task.
///
/// Delivery is push-only: the owner of the room state enqueues events here
/// and a per-connection writer task drains them onto the socket. A slow or
/// dead peer can never block a room transition.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the server.
    pub id: ConnId,
    /// Peer address, kept for logging.
    pub addr: SocketAddr,
    /// Outbound queue consumed by the connection's writer task.
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Manages all registered connections and routes outgoing events
///
/// The ConnectionManager assigns monotonically increasing connection ids,
/// enforces the configured connection limit, and implements the two delivery
/// modes the room produces: unicast (errors, join confirmations, snapshots)
/// and broadcast (roster and game-state updates to everyone).
pub struct ConnectionManager {
    /// Registered connections indexed by their unique ID.
    connections: HashMap<ConnId, Connection>,
    /// Next available connection ID.
    next_conn_id: ConnId,
    /// Maximum number of concurrent connections allowed.
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_conn_id: 1,
            max_connections,
        }
    }

    /// Registers a new connection and returns its id, or `None` when the
    /// server is at capacity.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Option<ConnId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        info!("connection {} registered from {}", conn_id, addr);
        self.connections.insert(
            conn_id,
            Connection {
                id: conn_id,
                addr,
                sender,
            },
        );

        Some(conn_id)
    }

    /// Removes a connection. Returns true if it was still registered.
    pub fn unregister(&mut self, conn_id: &ConnId) -> bool {
        if let Some(connection) = self.connections.remove(conn_id) {
            info!(
                "connection {} from {} unregistered",
                connection.id, connection.addr
            );
            true
        } else {
            false
        }
    }

    /// Delivers an event to a single connection. A missing or closed
    /// connection is logged and otherwise ignored; the room has already
    /// moved on and the reader task will surface the disconnect.
    pub fn unicast(&self, conn_id: ConnId, event: ServerEvent) {
        match self.connections.get(&conn_id) {
            Some(connection) => {
                if connection.sender.send(event).is_err() {
                    warn!("dropping unicast to closed connection {}", conn_id);
                }
            }
            None => warn!("dropping unicast to unknown connection {}", conn_id),
        }
    }

    /// Delivers an event to every registered connection, bound or not.
    pub fn broadcast(&self, event: ServerEvent) {
        for connection in self.connections.values() {
            if connection.sender.send(event.clone()).is_err() {
                warn!("dropping broadcast to closed connection {}", connection.id);
            }
        }
    }

    /// Returns the number of currently registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
