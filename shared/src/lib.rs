//! Protocol and game-model types shared between the bingo server and its clients.
//!
//! Everything in here is pure data plus the wire codec: board cells, line
//! counting, the client/server event enums and the length-prefixed bincode
//! framing used over TCP. No networking state lives in this crate.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Number of drawable values; equals the cell count so every board is fully
/// covered once the pool is exhausted.
pub const POOL_SIZE: u8 = 25;
/// Side length of the square board.
pub const GRID_SIDE: usize = 5;
/// Completed lines required to win the game.
pub const WIN_THRESHOLD: u32 = 3;
/// Wire protocol version; clients announcing a different one are refused.
pub const PROTOCOL_VERSION: u32 = 1;
/// Upper bound on a single wire frame body.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// One square of a bingo board. `marked` only ever flips false -> true.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub value: u8,
    pub marked: bool,
}

/// A 5x5 bingo board laid out row-major.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Board {
    pub cells: [[Cell; GRID_SIDE]; GRID_SIDE],
}

impl Board {
    /// Builds a board from a row-major value sequence with all cells unmarked.
    ///
    /// The caller must supply exactly `GRID_SIDE * GRID_SIDE` values; anything
    /// else is a programming error, not a runtime condition.
    pub fn from_values(values: &[u8]) -> Self {
        assert_eq!(
            values.len(),
            GRID_SIDE * GRID_SIDE,
            "board requires {} values",
            GRID_SIDE * GRID_SIDE
        );

        let mut cells = [[Cell {
            value: 0,
            marked: false,
        }; GRID_SIDE]; GRID_SIDE];

        for (i, &value) in values.iter().enumerate() {
            cells[i / GRID_SIDE][i % GRID_SIDE] = Cell {
                value,
                marked: false,
            };
        }

        Board { cells }
    }

    /// Marks every cell holding `value`. Marking an already-marked cell is a
    /// no-op, so a replayed draw cannot change board state.
    pub fn mark(&mut self, value: u8) {
        for row in self.cells.iter_mut() {
            for cell in row.iter_mut() {
                if cell.value == value {
                    cell.marked = true;
                }
            }
        }
    }

    /// Counts completed lines: 5 rows, 5 columns, both diagonals.
    ///
    /// Lines are not mutually exclusive; a fully marked board counts all 12.
    /// Pure and deterministic given the marked set, independent of the order
    /// in which cells were marked.
    pub fn count_lines(&self) -> u32 {
        let mut lines = 0;

        for row in self.cells.iter() {
            if row.iter().all(|cell| cell.marked) {
                lines += 1;
            }
        }

        for col in 0..GRID_SIDE {
            if (0..GRID_SIDE).all(|row| self.cells[row][col].marked) {
                lines += 1;
            }
        }

        if (0..GRID_SIDE).all(|i| self.cells[i][i].marked) {
            lines += 1;
        }

        if (0..GRID_SIDE).all(|i| self.cells[i][GRID_SIDE - 1 - i].marked) {
            lines += 1;
        }

        lines
    }

    /// Iterates all cells row-major.
    pub fn cells_flat(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flat_map(|row| row.iter())
    }
}

/// Lifecycle of the single game room.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    Running,
    Finished,
}

/// Roster entry broadcast to everyone; deliberately excludes the board.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: u64,
    pub nickname: String,
    pub line_count: u32,
    pub is_host: bool,
}

/// Roster entry including the full board, sent when a game starts.
///
/// Every connected client receives every player's board contents; hiding
/// opponents' unmarked numbers is a client display concern, not a protocol
/// guarantee.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub id: u64,
    pub nickname: String,
    pub board: Board,
    pub line_count: u32,
    pub is_host: bool,
}

/// Events a client may send. Disconnect is implicit (socket close).
///
/// `Join` doubles as the handshake: it announces the client's protocol
/// version, which the server checks against [`PROTOCOL_VERSION`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join {
        nickname: String,
        protocol_version: u32,
    },
    StartGame,
    DrawNumber,
    RestartGame,
}

/// Events the server sends, either to one connection or to all of them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerEvent {
    /// Unicast snapshot sent immediately after a connection registers.
    GameState {
        status: GameStatus,
        players: Vec<PlayerSummary>,
        called_numbers: Vec<u8>,
        winner: Option<String>,
    },
    /// Unicast join confirmation.
    Joined {
        nickname: String,
        is_host: bool,
        players: Vec<PlayerSummary>,
    },
    /// Unicast rejection of the sender's last event.
    Error { message: String },
    PlayerListUpdate {
        players: Vec<PlayerSummary>,
    },
    GameStarted {
        players: Vec<PlayerView>,
    },
    NumberDrawn {
        number: u8,
        called_numbers: Vec<u8>,
        players: Vec<PlayerSummary>,
    },
    BingoComplete {
        winner: String,
        bingo_count: u32,
        players: Vec<PlayerSummary>,
    },
    GameRestarted {
        players: Vec<PlayerSummary>,
    },
    HostChanged {
        new_host: String,
        players: Vec<PlayerSummary>,
    },
}

/// Writes one length-prefixed bincode frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body =
        bincode::serialize(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if body.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }

    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame body without decoding it.
///
/// Returns `UnexpectedEof` when the peer closes between frames and
/// `InvalidData` for an oversized declared length. The body is consumed in
/// full, so a caller that fails to decode it can keep reading the stream.
pub async fn read_frame_bytes<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Reads and decodes one length-prefixed bincode frame.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let body = read_frame_bytes(reader).await?;
    bincode::deserialize(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
