//! # Bingo Game Server Library
//!
//! This library provides the authoritative server implementation for a
//! room-based multiplayer bingo game. One server process hosts one room:
//! players join with a nickname, the host starts the game, draws numbers
//! one at a time, and the first player to complete three lines wins.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server owns the only copy of the game state: the player roster, the
//! call history, the per-player boards and the win condition. Clients render
//! whatever the server broadcasts; they never compute game outcomes locally.
//!
//! ### Host Authority
//! Exactly one player is the host whenever the room is non-empty. Only the
//! host may start, advance or restart the game; anyone else attempting a
//! host action receives a unicast error and the room is left untouched.
//! When the host disconnects, the next player in join order inherits the
//! role.
//!
//! ### Broadcast Protocol
//! State transitions fan out to every connected client as self-contained
//! events carrying the full roster, call history or boards, so clients can
//! rebuild their view without follow-up queries.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All state-mutating events (join, start, draw, restart, disconnect) flow
//! through one mpsc queue consumed by a single task that owns the room.
//! Transitions are finite, non-blocking computations, so serializing them
//! eliminates race conditions without any locking in the handlers.
//!
//! ### Explicit State Machine
//! The room consumes a tagged event union and returns delivery instructions
//! as data, keeping the whole state machine exercisable in tests without a
//! socket in sight.
//!
//! ## Module Organization
//!
//! - [`board`] — unbiased board generation for new games
//! - [`room`] — the authoritative room state machine and its transitions
//! - [`connection`] — connection registry plus unicast/broadcast dispatch
//! - [`network`] — TCP listener, per-connection tasks and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod connection;
pub mod network;
pub mod room;
