//! Authoritative room state machine.
//!
//! This module owns every piece of mutable game state: the player roster,
//! the call history, the game status and the winner. All mutation flows
//! through [`Room::apply`], which consumes one [`RoomEvent`] at a time and
//! returns the messages to deliver as plain data ([`Outcome`] values).
//! Nothing in here touches the network, which keeps every transition
//! testable without sockets and lets the caller serialize events however
//! it likes.
//!
//! A violated precondition produces exactly one unicast [`ServerEvent::Error`]
//! for the offending connection and leaves the room untouched.

use crate::board::generate_board;
use log::info;
use rand::Rng;
use shared::{Board, GameStatus, PlayerSummary, PlayerView, ServerEvent, POOL_SIZE, WIN_THRESHOLD};
use thiserror::Error;

/// Stable identifier of one client connection, assigned by the server.
pub type ConnId = u64;

/// Recoverable reasons a transition can be refused. The rendered message is
/// what the offending client receives; the room never mutates on any of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// A non-host attempted a host-only action.
    #[error("only the host can {0}")]
    Authorization(&'static str),
    /// Bad join input.
    #[error("{0}")]
    Validation(&'static str),
    /// The action is not valid for the current game status.
    #[error("the game is not running")]
    State,
    /// Every number in the pool has already been called.
    #[error("all numbers have already been called")]
    Exhausted,
}

/// One client-triggered transition, already resolved to a connection id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Join { conn_id: ConnId, nickname: String },
    StartGame { conn_id: ConnId },
    DrawNumber { conn_id: ConnId },
    RestartGame { conn_id: ConnId },
    Disconnect { conn_id: ConnId },
}

/// A delivery instruction produced by a transition. The dispatcher decides
/// how to get it onto the wire; the room only says who should hear what.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unicast { conn_id: ConnId, event: ServerEvent },
    Broadcast { event: ServerEvent },
}

/// A joined player. The board is `None` while the room is waiting.
#[derive(Debug, Clone)]
pub struct Player {
    pub conn_id: ConnId,
    pub nickname: String,
    pub board: Option<Board>,
    pub line_count: u32,
    pub is_host: bool,
}

/// The single game room. Players keep join order; host reassignment never
/// reorders them.
#[derive(Debug)]
pub struct Room {
    pub status: GameStatus,
    pub players: Vec<Player>,
    pub called_numbers: Vec<u8>,
    pub winner: Option<String>,
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

impl Room {
    pub fn new() -> Self {
        Self {
            status: GameStatus::Waiting,
            players: Vec::new(),
            called_numbers: Vec::new(),
            winner: None,
        }
    }

    /// Applies one event and returns the deliveries it produced.
    ///
    /// The caller must feed events one at a time; the room assumes it is the
    /// only writer between calls.
    pub fn apply<R: Rng>(&mut self, event: RoomEvent, rng: &mut R) -> Vec<Outcome> {
        match event {
            RoomEvent::Join { conn_id, nickname } => self.join(conn_id, &nickname),
            RoomEvent::StartGame { conn_id } => self.start_game(conn_id, rng),
            RoomEvent::DrawNumber { conn_id } => self.draw_number(conn_id, rng),
            RoomEvent::RestartGame { conn_id } => self.restart_game(conn_id),
            RoomEvent::Disconnect { conn_id } => self.disconnect(conn_id),
        }
    }

    /// Full room snapshot for a freshly registered connection. Boards are
    /// never part of the snapshot.
    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::GameState {
            status: self.status,
            players: self.roster(),
            called_numbers: self.called_numbers.clone(),
            winner: self.winner.clone(),
        }
    }

    fn roster(&self) -> Vec<PlayerSummary> {
        self.players
            .iter()
            .map(|player| PlayerSummary {
                id: player.conn_id,
                nickname: player.nickname.clone(),
                line_count: player.line_count,
                is_host: player.is_host,
            })
            .collect()
    }

    fn is_host(&self, conn_id: ConnId) -> bool {
        self.players
            .iter()
            .any(|player| player.conn_id == conn_id && player.is_host)
    }

    fn reject(conn_id: ConnId, error: RoomError) -> Vec<Outcome> {
        vec![Outcome::Unicast {
            conn_id,
            event: ServerEvent::Error {
                message: error.to_string(),
            },
        }]
    }

    fn join(&mut self, conn_id: ConnId, nickname: &str) -> Vec<Outcome> {
        let nickname = nickname.trim();

        if nickname.is_empty() {
            return Self::reject(conn_id, RoomError::Validation("please enter a nickname"));
        }
        if self.players.iter().any(|p| p.nickname == nickname) {
            return Self::reject(
                conn_id,
                RoomError::Validation("that nickname is already in use"),
            );
        }
        if self.players.iter().any(|p| p.conn_id == conn_id) {
            return Self::reject(
                conn_id,
                RoomError::Validation("this connection has already joined"),
            );
        }

        // First player into an empty room becomes host.
        let is_host = self.players.is_empty();
        self.players.push(Player {
            conn_id,
            nickname: nickname.to_string(),
            board: None,
            line_count: 0,
            is_host,
        });

        info!(
            "{} (connection {}) joined, host: {}",
            nickname, conn_id, is_host
        );

        vec![
            Outcome::Unicast {
                conn_id,
                event: ServerEvent::Joined {
                    nickname: nickname.to_string(),
                    is_host,
                    players: self.roster(),
                },
            },
            Outcome::Broadcast {
                event: ServerEvent::PlayerListUpdate {
                    players: self.roster(),
                },
            },
        ]
    }

    fn start_game<R: Rng>(&mut self, conn_id: ConnId, rng: &mut R) -> Vec<Outcome> {
        if !self.is_host(conn_id) {
            return Self::reject(conn_id, RoomError::Authorization("start the game"));
        }

        self.called_numbers.clear();
        self.winner = None;
        self.status = GameStatus::Running;

        let mut views = Vec::with_capacity(self.players.len());
        for player in self.players.iter_mut() {
            let board = generate_board(rng);
            player.board = Some(board.clone());
            player.line_count = 0;
            views.push(PlayerView {
                id: player.conn_id,
                nickname: player.nickname.clone(),
                board,
                line_count: 0,
                is_host: player.is_host,
            });
        }

        info!("game started with {} players", self.players.len());

        vec![Outcome::Broadcast {
            event: ServerEvent::GameStarted { players: views },
        }]
    }

    fn draw_number<R: Rng>(&mut self, conn_id: ConnId, rng: &mut R) -> Vec<Outcome> {
        if !self.is_host(conn_id) {
            return Self::reject(conn_id, RoomError::Authorization("draw numbers"));
        }
        if self.status != GameStatus::Running {
            return Self::reject(conn_id, RoomError::State);
        }

        let remaining: Vec<u8> = (1..=POOL_SIZE)
            .filter(|n| !self.called_numbers.contains(n))
            .collect();
        if remaining.is_empty() {
            return Self::reject(conn_id, RoomError::Exhausted);
        }

        let number = remaining[rng.gen_range(0..remaining.len())];
        self.complete_draw(number)
    }

    /// Applies an already-chosen number: appends it to the call history,
    /// marks it on every board, recomputes line counts and checks the win
    /// condition. Split from the random selection so the win path is
    /// deterministic under test.
    fn complete_draw(&mut self, number: u8) -> Vec<Outcome> {
        self.called_numbers.push(number);

        for player in self.players.iter_mut() {
            if let Some(board) = &mut player.board {
                board.mark(number);
                player.line_count = board.count_lines();
            }
        }

        info!("number drawn: {}", number);

        // Tie-break is join order: the first player at or past the threshold
        // wins, regardless of who has more lines.
        let winner = self
            .players
            .iter()
            .find(|player| player.line_count >= WIN_THRESHOLD);

        if let Some(winner) = winner {
            let winner_nickname = winner.nickname.clone();
            let bingo_count = winner.line_count;

            self.status = GameStatus::Finished;
            self.winner = Some(winner_nickname.clone());

            info!("bingo complete, winner: {}", winner_nickname);

            vec![Outcome::Broadcast {
                event: ServerEvent::BingoComplete {
                    winner: winner_nickname,
                    bingo_count,
                    players: self.roster(),
                },
            }]
        } else {
            vec![Outcome::Broadcast {
                event: ServerEvent::NumberDrawn {
                    number,
                    called_numbers: self.called_numbers.clone(),
                    players: self.roster(),
                },
            }]
        }
    }

    fn restart_game(&mut self, conn_id: ConnId) -> Vec<Outcome> {
        if !self.is_host(conn_id) {
            return Self::reject(conn_id, RoomError::Authorization("restart the game"));
        }

        self.called_numbers.clear();
        self.winner = None;
        self.status = GameStatus::Waiting;

        for player in self.players.iter_mut() {
            player.board = None;
            player.line_count = 0;
        }

        info!("game restarted");

        vec![Outcome::Broadcast {
            event: ServerEvent::GameRestarted {
                players: self.roster(),
            },
        }]
    }

    fn disconnect(&mut self, conn_id: ConnId) -> Vec<Outcome> {
        let index = match self.players.iter().position(|p| p.conn_id == conn_id) {
            Some(index) => index,
            // Events from connections that never joined are a no-op.
            None => return Vec::new(),
        };

        let removed = self.players.remove(index);
        info!("{} (connection {}) left", removed.nickname, conn_id);

        let mut outcomes = Vec::new();

        if removed.is_host {
            if let Some(new_host) = self.players.first_mut() {
                new_host.is_host = true;
                let new_host_nickname = new_host.nickname.clone();
                info!("host reassigned to {}", new_host_nickname);

                outcomes.push(Outcome::Broadcast {
                    event: ServerEvent::HostChanged {
                        new_host: new_host_nickname,
                        players: self.roster(),
                    },
                });
            }
        }

        outcomes.push(Outcome::Broadcast {
            event: ServerEvent::PlayerListUpdate {
                players: self.roster(),
            },
        });

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1234)
    }

    fn join(room: &mut Room, conn_id: ConnId, nickname: &str) -> Vec<Outcome> {
        room.apply(
            RoomEvent::Join {
                conn_id,
                nickname: nickname.to_string(),
            },
            &mut rng(),
        )
    }

    fn error_message(outcomes: &[Outcome]) -> &str {
        match outcomes {
            [Outcome::Unicast {
                event: ServerEvent::Error { message },
                ..
            }] => message,
            other => panic!("expected a single error unicast, got {:?}", other),
        }
    }

    fn two_player_room() -> Room {
        let mut room = Room::new();
        join(&mut room, 1, "Alice");
        join(&mut room, 2, "Bob");
        room
    }

    /// Sequential board plus a premarked state where one more value (21)
    /// completes column 0 as a third line.
    fn board_two_lines_short_of_column() -> Board {
        let values: Vec<u8> = (1..=POOL_SIZE).collect();
        let mut board = Board::from_values(&values);
        for value in (1..=11).chain([16]) {
            board.mark(value);
        }
        board
    }

    #[test]
    fn test_first_joiner_becomes_host() {
        let mut room = Room::new();
        let outcomes = join(&mut room, 1, "Alice");
        join(&mut room, 2, "Bob");

        assert!(room.players[0].is_host);
        assert!(!room.players[1].is_host);

        match &outcomes[0] {
            Outcome::Unicast {
                conn_id: 1,
                event: ServerEvent::Joined {
                    nickname, is_host, ..
                },
            } => {
                assert_eq!(nickname, "Alice");
                assert!(*is_host);
            }
            other => panic!("expected join confirmation, got {:?}", other),
        }
        assert!(matches!(
            outcomes[1],
            Outcome::Broadcast {
                event: ServerEvent::PlayerListUpdate { .. }
            }
        ));
    }

    #[test]
    fn test_join_trims_nickname() {
        let mut room = Room::new();
        join(&mut room, 1, "  Alice  ");
        assert_eq!(room.players[0].nickname, "Alice");
    }

    #[test]
    fn test_join_rejects_empty_nickname() {
        let mut room = Room::new();
        let outcomes = join(&mut room, 1, "   ");

        assert_eq!(error_message(&outcomes), "please enter a nickname");
        assert!(room.players.is_empty());
    }

    #[test]
    fn test_join_rejects_duplicate_nickname() {
        let mut room = Room::new();
        join(&mut room, 1, "Alice");
        let outcomes = join(&mut room, 2, "Alice");

        assert_eq!(error_message(&outcomes), "that nickname is already in use");
        assert_eq!(room.players.len(), 1);
    }

    #[test]
    fn test_join_rejects_rebinding_a_joined_connection() {
        let mut room = Room::new();
        join(&mut room, 1, "Alice");
        let outcomes = join(&mut room, 1, "Alice2");

        assert_eq!(
            error_message(&outcomes),
            "this connection has already joined"
        );
        assert_eq!(room.players.len(), 1);
    }

    #[test]
    fn test_non_host_cannot_start_game() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::StartGame { conn_id: 2 }, &mut rng());

        assert_eq!(error_message(&outcomes), "only the host can start the game");
        assert_eq!(room.status, GameStatus::Waiting);
        assert!(room.players.iter().all(|p| p.board.is_none()));
    }

    #[test]
    fn test_unjoined_connection_cannot_start_game() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::StartGame { conn_id: 99 }, &mut rng());

        assert_eq!(error_message(&outcomes), "only the host can start the game");
        assert_eq!(room.status, GameStatus::Waiting);
    }

    #[test]
    fn test_host_starts_game_with_fresh_boards() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::StartGame { conn_id: 1 }, &mut rng());

        assert_eq!(room.status, GameStatus::Running);
        assert!(room.called_numbers.is_empty());
        assert_eq!(room.winner, None);

        for player in room.players.iter() {
            assert_eq!(player.line_count, 0);
            let board = player.board.as_ref().unwrap();
            let values: HashSet<u8> = board.cells_flat().map(|c| c.value).collect();
            assert_eq!(values.len(), 25);
            assert!(board.cells_flat().all(|c| !c.marked));
        }

        // Players get independently shuffled boards.
        assert_ne!(room.players[0].board, room.players[1].board);

        match &outcomes[..] {
            [Outcome::Broadcast {
                event: ServerEvent::GameStarted { players },
            }] => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[0].nickname, "Alice");
                assert_eq!(players[1].nickname, "Bob");
            }
            other => panic!("expected a GameStarted broadcast, got {:?}", other),
        }
    }

    #[test]
    fn test_non_host_cannot_draw() {
        let mut room = two_player_room();
        room.apply(RoomEvent::StartGame { conn_id: 1 }, &mut rng());
        let outcomes = room.apply(RoomEvent::DrawNumber { conn_id: 2 }, &mut rng());

        assert_eq!(error_message(&outcomes), "only the host can draw numbers");
        assert!(room.called_numbers.is_empty());
    }

    #[test]
    fn test_draw_rejected_while_waiting() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng());

        assert_eq!(error_message(&outcomes), "the game is not running");
        assert!(room.called_numbers.is_empty());
    }

    #[test]
    fn test_draws_are_unique_and_bounded() {
        // Boardless players never win, so the whole pool can be walked.
        let mut room = Room::new();
        join(&mut room, 1, "Alice");
        room.status = GameStatus::Running;

        let mut rng = rng();
        for _ in 0..POOL_SIZE {
            let outcomes = room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng);
            assert!(matches!(
                outcomes[0],
                Outcome::Broadcast {
                    event: ServerEvent::NumberDrawn { .. }
                }
            ));
        }

        let unique: HashSet<u8> = room.called_numbers.iter().copied().collect();
        assert_eq!(room.called_numbers.len(), POOL_SIZE as usize);
        assert_eq!(unique.len(), POOL_SIZE as usize);
        assert!(unique.iter().all(|&n| (1..=POOL_SIZE).contains(&n)));
    }

    #[test]
    fn test_exhausted_pool_rejects_draw_without_mutation() {
        let mut room = Room::new();
        join(&mut room, 1, "Alice");
        room.status = GameStatus::Running;
        room.called_numbers = (1..=POOL_SIZE).collect();

        let outcomes = room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng());

        assert_eq!(
            error_message(&outcomes),
            "all numbers have already been called"
        );
        assert_eq!(room.called_numbers.len(), POOL_SIZE as usize);
        assert_eq!(room.status, GameStatus::Running);
    }

    #[test]
    fn test_game_finishes_at_win_threshold() {
        let mut room = two_player_room();
        let mut rng = rng();
        room.apply(RoomEvent::StartGame { conn_id: 1 }, &mut rng);

        let mut finished = false;
        for _ in 0..POOL_SIZE {
            let outcomes = room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng);
            if let [Outcome::Broadcast {
                event: ServerEvent::BingoComplete { winner, .. },
            }] = &outcomes[..]
            {
                // Winner is the first player in join order at the threshold.
                let expected = room
                    .players
                    .iter()
                    .find(|p| p.line_count >= WIN_THRESHOLD)
                    .map(|p| p.nickname.clone())
                    .unwrap();
                assert_eq!(*winner, expected);
                finished = true;
                break;
            }
        }

        assert!(finished, "full pool coverage must complete every board");
        assert_eq!(room.status, GameStatus::Finished);
        assert!(room.winner.is_some());
    }

    #[test]
    fn test_no_draw_mutates_after_finish() {
        let mut room = two_player_room();
        let mut rng = rng();
        room.apply(RoomEvent::StartGame { conn_id: 1 }, &mut rng);
        while room.status != GameStatus::Finished {
            room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng);
        }

        let called_before = room.called_numbers.clone();
        let winner_before = room.winner.clone();
        let outcomes = room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng);

        assert_eq!(error_message(&outcomes), "the game is not running");
        assert_eq!(room.called_numbers, called_before);
        assert_eq!(room.winner, winner_before);
        assert_eq!(room.status, GameStatus::Finished);
    }

    #[test]
    fn test_simultaneous_threshold_tie_breaks_by_join_order() {
        let mut room = two_player_room();
        room.status = GameStatus::Running;
        for player in room.players.iter_mut() {
            player.board = Some(board_two_lines_short_of_column());
            player.line_count = 2;
        }
        room.called_numbers = (1..=11).chain([16]).collect();

        // 21 completes column 0 (1, 6, 11, 16, 21) on both identical boards.
        let outcomes = room.complete_draw(21);

        match &outcomes[..] {
            [Outcome::Broadcast {
                event:
                    ServerEvent::BingoComplete {
                        winner,
                        bingo_count,
                        ..
                    },
            }] => {
                assert_eq!(winner, "Alice");
                assert_eq!(*bingo_count, 3);
            }
            other => panic!("expected BingoComplete, got {:?}", other),
        }

        assert_eq!(room.players[0].line_count, 3);
        assert_eq!(room.players[1].line_count, 3);
        assert_eq!(room.winner.as_deref(), Some("Alice"));
        assert_eq!(room.status, GameStatus::Finished);
    }

    #[test]
    fn test_restart_resets_to_waiting() {
        let mut room = two_player_room();
        let mut rng = rng();
        room.apply(RoomEvent::StartGame { conn_id: 1 }, &mut rng);
        while room.status != GameStatus::Finished {
            room.apply(RoomEvent::DrawNumber { conn_id: 1 }, &mut rng);
        }

        let outcomes = room.apply(RoomEvent::RestartGame { conn_id: 1 }, &mut rng);

        assert_eq!(room.status, GameStatus::Waiting);
        assert!(room.called_numbers.is_empty());
        assert_eq!(room.winner, None);
        assert!(room
            .players
            .iter()
            .all(|p| p.board.is_none() && p.line_count == 0));
        assert!(matches!(
            outcomes[..],
            [Outcome::Broadcast {
                event: ServerEvent::GameRestarted { .. }
            }]
        ));
    }

    #[test]
    fn test_non_host_cannot_restart() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::RestartGame { conn_id: 2 }, &mut rng());
        assert_eq!(
            error_message(&outcomes),
            "only the host can restart the game"
        );
    }

    #[test]
    fn test_host_disconnect_reassigns_in_join_order() {
        let mut room = two_player_room();
        join(&mut room, 3, "Carol");

        let outcomes = room.apply(RoomEvent::Disconnect { conn_id: 1 }, &mut rng());

        assert_eq!(room.players.len(), 2);
        assert_eq!(room.players[0].nickname, "Bob");
        assert!(room.players[0].is_host);
        assert!(!room.players[1].is_host);

        match &outcomes[..] {
            [Outcome::Broadcast {
                event: ServerEvent::HostChanged { new_host, .. },
            }, Outcome::Broadcast {
                event: ServerEvent::PlayerListUpdate { .. },
            }] => assert_eq!(new_host, "Bob"),
            other => panic!("expected HostChanged then PlayerListUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_non_host_disconnect_keeps_host() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::Disconnect { conn_id: 2 }, &mut rng());

        assert_eq!(room.players.len(), 1);
        assert!(room.players[0].is_host);
        assert!(matches!(
            outcomes[..],
            [Outcome::Broadcast {
                event: ServerEvent::PlayerListUpdate { .. }
            }]
        ));
    }

    #[test]
    fn test_last_player_disconnect_emits_no_host_change() {
        let mut room = Room::new();
        join(&mut room, 1, "Alice");

        let outcomes = room.apply(RoomEvent::Disconnect { conn_id: 1 }, &mut rng());

        assert!(room.players.is_empty());
        assert!(matches!(
            outcomes[..],
            [Outcome::Broadcast {
                event: ServerEvent::PlayerListUpdate { .. }
            }]
        ));
    }

    #[test]
    fn test_disconnect_of_unbound_connection_is_noop() {
        let mut room = two_player_room();
        let outcomes = room.apply(RoomEvent::Disconnect { conn_id: 99 }, &mut rng());

        assert!(outcomes.is_empty());
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn test_exactly_one_host_after_any_churn() {
        let mut room = Room::new();
        let mut rng = rng();

        let sequence = [
            RoomEvent::Join {
                conn_id: 1,
                nickname: "Alice".to_string(),
            },
            RoomEvent::Join {
                conn_id: 2,
                nickname: "Bob".to_string(),
            },
            RoomEvent::Disconnect { conn_id: 1 },
            RoomEvent::Join {
                conn_id: 3,
                nickname: "Carol".to_string(),
            },
            RoomEvent::Disconnect { conn_id: 2 },
            RoomEvent::Join {
                conn_id: 4,
                nickname: "Dave".to_string(),
            },
            RoomEvent::Disconnect { conn_id: 4 },
        ];

        for event in sequence {
            room.apply(event, &mut rng);
            if !room.players.is_empty() {
                let hosts = room.players.iter().filter(|p| p.is_host).count();
                assert_eq!(hosts, 1);
            }
        }
    }

    #[test]
    fn test_snapshot_reflects_room_state() {
        let mut room = two_player_room();
        room.apply(RoomEvent::StartGame { conn_id: 1 }, &mut rng());

        match room.snapshot() {
            ServerEvent::GameState {
                status,
                players,
                called_numbers,
                winner,
            } => {
                assert_eq!(status, GameStatus::Running);
                assert_eq!(players.len(), 2);
                assert!(called_numbers.is_empty());
                assert_eq!(winner, None);
            }
            other => panic!("expected GameState, got {:?}", other),
        }
    }
}
