//! Board generation for new games.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Board, GRID_SIDE, POOL_SIZE};

// The pool must cover the grid exactly so the game cannot stall with
// unmarkable cells.
const _: () = assert!(POOL_SIZE as usize == GRID_SIDE * GRID_SIDE);

/// Generates a fresh board: an unbiased permutation of `1..=POOL_SIZE`
/// laid out row-major with every cell unmarked.
///
/// Uses `SliceRandom::shuffle`, a Fisher-Yates shuffle, so every permutation
/// is equally likely.
pub fn generate_board<R: Rng>(rng: &mut R) -> Board {
    let mut values: Vec<u8> = (1..=POOL_SIZE).collect();
    values.shuffle(rng);
    Board::from_values(&values)
}
