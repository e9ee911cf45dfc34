use std::fmt::{self, Display};

use crate::game::common::{GameColor, GameOutcome, IGame};

pub const BOARD_SIZE: usize = 3;
pub const MOVES_NUM: usize = BOARD_SIZE * BOARD_SIZE;

const WINNING_SEQUENCES: [u16; 8] = [
    0b111000000, // row 1
    0b000111000, // row 2
    0b000000111, // row 3
    0b100100100, // col 1
    0b010010010, // col 2
    0b001001001, // col 3
    0b100010001, // diagonal 1
    0b001010100, // diagonal 2
];
const FULL_BOARD: u16 = (1 << MOVES_NUM) - 1;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TttPosition {
    board_x: u16,
    board_o: u16,
    turn: GameColor,
}

impl TttPosition {
    pub fn new() -> Self {
        Self {
            board_x: 0,
            board_o: 0,
            turn: GameColor::Player1,
        }
    }

    /// Parse a position from 9 tiles ('x', 'o' or '_') followed by the player to move.
    ///
    /// "xxo_o____x" is a position where x is to move.
    pub fn from_str(s: &str) -> Self {
        assert_eq!(s.len(), MOVES_NUM + 1);
        let mut pos = Self::new();
        for (idx, tile) in s.chars().take(MOVES_NUM).enumerate() {
            match tile {
                'x' => pos.board_x |= 1 << idx,
                'o' => pos.board_o |= 1 << idx,
                '_' => {}
                other => panic!("unknown tile: {other}"),
            }
        }
        pos.turn = match s.chars().last() {
            Some('x') => GameColor::Player1,
            Some('o') => GameColor::Player2,
            other => panic!("unknown turn: {other:?}"),
        };
        pos
    }

    pub fn get_turn(&self) -> GameColor {
        self.turn
    }

    pub fn get_tile(&self, idx: usize) -> Option<GameColor> {
        assert!(idx < MOVES_NUM);
        if self.board_x & (1 << idx) != 0 {
            Some(GameColor::Player1)
        } else if self.board_o & (1 << idx) != 0 {
            Some(GameColor::Player2)
        } else {
            None
        }
    }

    pub fn get_winner(&self) -> Option<GameColor> {
        for seq in WINNING_SEQUENCES {
            if self.board_x & seq == seq {
                return Some(GameColor::Player1);
            }
            if self.board_o & seq == seq {
                return Some(GameColor::Player2);
            }
        }
        None
    }

    pub fn is_over(&self) -> bool {
        self.get_winner().is_some() || (self.board_x | self.board_o) == FULL_BOARD
    }

    pub fn is_valid_move(&self, idx: usize) -> bool {
        idx < MOVES_NUM && !self.is_over() && self.get_tile(idx).is_none()
    }

    pub fn make_move_new(&self, idx: usize) -> Self {
        assert!(self.is_valid_move(idx), "invalid move {idx}");
        let mut res = *self;
        match self.turn {
            GameColor::Player1 => res.board_x |= 1 << idx,
            GameColor::Player2 => res.board_o |= 1 << idx,
        }
        res.turn = self.turn.opposite();
        res
    }
}

impl Default for TttPosition {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TttPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..BOARD_SIZE {
            for c in 0..BOARD_SIZE {
                let tile = match self.get_tile(r * BOARD_SIZE + c) {
                    Some(GameColor::Player1) => 'X',
                    Some(GameColor::Player2) => 'O',
                    None => '_',
                };
                write!(f, "{tile}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Map a tile index through one of the 8 symmetries of the square.
///
/// `transform` in `0..8`: the low two bits are the number of quarter turns, the third bit a
/// horizontal mirror applied after the rotation.
pub fn transform_idx(idx: usize, transform: usize) -> usize {
    let (mut r, mut c) = (idx / BOARD_SIZE, idx % BOARD_SIZE);
    for _ in 0..(transform % 4) {
        (r, c) = (c, BOARD_SIZE - 1 - r);
    }
    if transform >= 4 {
        c = BOARD_SIZE - 1 - c;
    }
    r * BOARD_SIZE + c
}

#[derive(Clone, Copy, Default, Debug)]
pub struct TttGame;

impl IGame for TttGame {
    type State = TttPosition;

    fn action_size(&self) -> usize {
        MOVES_NUM
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![1, BOARD_SIZE, BOARD_SIZE]
    }

    fn initial_state(&self) -> TttPosition {
        TttPosition::new()
    }

    fn current_player(&self, state: &TttPosition) -> GameColor {
        state.get_turn()
    }

    fn legal_moves(&self, state: &TttPosition) -> Vec<bool> {
        (0..MOVES_NUM).map(|idx| state.is_valid_move(idx)).collect()
    }

    fn apply_move(&self, state: &TttPosition, action: usize) -> TttPosition {
        state.make_move_new(action)
    }

    fn terminal_result(&self, state: &TttPosition) -> Option<GameOutcome> {
        if let Some(winner) = state.get_winner() {
            Some(GameOutcome::Win(winner))
        } else if state.is_over() {
            Some(GameOutcome::Draw)
        } else {
            None
        }
    }

    fn canonical_observation(&self, state: &TttPosition) -> Vec<f32> {
        let turn = state.get_turn();
        (0..MOVES_NUM)
            .map(|idx| match state.get_tile(idx) {
                Some(color) if color == turn => 1.0,
                Some(_) => -1.0,
                None => 0.0,
            })
            .collect()
    }

    fn symmetries(&self, observation: &[f32], policy: &[f32]) -> Vec<(Vec<f32>, Vec<f32>)> {
        assert_eq!(observation.len(), MOVES_NUM);
        assert_eq!(policy.len(), MOVES_NUM);
        (0..8)
            .map(|transform| {
                let mut obs = vec![0.0; MOVES_NUM];
                let mut pi = vec![0.0; MOVES_NUM];
                for idx in 0..MOVES_NUM {
                    let target = transform_idx(idx, transform);
                    obs[target] = observation[idx];
                    pi[target] = policy[idx];
                }
                (obs, pi)
            })
            .collect()
    }
}
