use itertools::Itertools;
use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;

use crate::error::Result;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GameColor {
    Player1,
    Player2,
}

impl GameColor {
    pub fn opposite(&self) -> GameColor {
        match self {
            GameColor::Player1 => GameColor::Player2,
            GameColor::Player2 => GameColor::Player1,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameOutcome {
    Win(GameColor),
    Draw,
}

impl GameOutcome {
    pub fn winner(&self) -> Option<GameColor> {
        match self {
            GameOutcome::Win(color) => Some(*color),
            GameOutcome::Draw => None,
        }
    }

    /// Score of the game from `player`'s point of view: 1 win, -1 loss, 0 draw.
    pub fn score_for(&self, player: GameColor) -> f32 {
        match self {
            GameOutcome::Win(color) if *color == player => 1.0,
            GameOutcome::Win(_) => -1.0,
            GameOutcome::Draw => 0.0,
        }
    }
}

/// Rules of a two player game, consumed by the simulators and the arena.
pub trait IGame: Send + Sync + 'static {
    type State: Clone + Send;

    fn action_size(&self) -> usize;
    fn observation_shape(&self) -> Vec<usize>;
    fn initial_state(&self) -> Self::State;
    fn current_player(&self, state: &Self::State) -> GameColor;
    /// Binary mask of length `action_size`.
    fn legal_moves(&self, state: &Self::State) -> Vec<bool>;
    fn apply_move(&self, state: &Self::State, action: usize) -> Self::State;
    fn terminal_result(&self, state: &Self::State) -> Option<GameOutcome>;
    /// Flattened observation from the perspective of the player to move.
    fn canonical_observation(&self, state: &Self::State) -> Vec<f32>;
    /// Equivalent `(observation, policy)` pairs, the identity included.
    fn symmetries(&self, observation: &[f32], policy: &[f32]) -> Vec<(Vec<f32>, Vec<f32>)>;

    fn observation_len(&self) -> usize {
        self.observation_shape().iter().product()
    }
}

/// A player choosing moves for a batch of positions at once.
///
/// Every state passed in has its player to move equal to the seat this player holds.
pub trait GamePlayer<Game: IGame> {
    fn next_moves(&mut self, game: &Game, states: &[&Game::State]) -> Result<Vec<usize>>;
}

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct GamesResults {
    pub w1: u32,
    pub w2: u32,
    pub d: u32,
}

impl GamesResults {
    pub fn record(&mut self, outcome: GameOutcome) {
        let counter = match outcome {
            GameOutcome::Win(GameColor::Player1) => &mut self.w1,
            GameOutcome::Win(GameColor::Player2) => &mut self.w2,
            GameOutcome::Draw => &mut self.d,
        };
        *counter += 1;
    }

    pub fn games_num(&self) -> u32 {
        self.w1 + self.w2 + self.d
    }

    pub fn wins(&self, player: GameColor) -> u32 {
        match player {
            GameColor::Player1 => self.w1,
            GameColor::Player2 => self.w2,
        }
    }

    /// `(wins + 0.5 * draws) / games`, zero when no game was played.
    pub fn winrate(&self, player: GameColor) -> f32 {
        let games = self.games_num();
        if games == 0 {
            return 0.0;
        }
        (self.wins(player) as f32 + 0.5 * self.d as f32) / games as f32
    }

    pub fn draw_rate(&self) -> f32 {
        let games = self.games_num();
        if games == 0 {
            return 0.0;
        }
        self.d as f32 / games as f32
    }
}

pub struct PlayerRand {
    rand: StdRng,
}
impl Default for PlayerRand {
    fn default() -> Self {
        Self::new()
    }
}
impl PlayerRand {
    pub fn new() -> Self {
        Self::from_seed(rand::thread_rng().gen())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rand: StdRng::seed_from_u64(seed),
        }
    }
}

impl<Game: IGame> GamePlayer<Game> for PlayerRand {
    fn next_moves(&mut self, game: &Game, states: &[&Game::State]) -> Result<Vec<usize>> {
        Ok(states
            .iter()
            .map(|state| {
                let legal = legal_indices(&game.legal_moves(state));
                legal[self.rand.gen_range(0..legal.len())]
            })
            .collect())
    }
}

pub fn legal_indices(legal_moves: &[bool]) -> Vec<usize> {
    legal_moves.iter().positions(|legal| *legal).collect_vec()
}

/// Zero the illegal entries of `policy` and renormalize.
///
/// Falls back to uniform over the legal moves when the estimator puts no mass on them.
pub fn mask_policy(policy: &[f32], legal_moves: &[bool]) -> Vec<f32> {
    assert_eq!(policy.len(), legal_moves.len());
    let mut masked = policy
        .iter()
        .zip(legal_moves)
        .map(|(p, legal)| if *legal && p.is_finite() { p.max(0.0) } else { 0.0 })
        .collect_vec();
    let sum: f32 = masked.iter().sum();
    if sum > 0.0 {
        masked.iter_mut().for_each(|p| *p /= sum);
    } else {
        let legal_num = legal_moves.iter().filter(|legal| **legal).count();
        for (p, legal) in masked.iter_mut().zip(legal_moves) {
            if *legal {
                *p = 1.0 / legal_num as f32;
            }
        }
    }
    masked
}

/// Pick an action from a probability vector, greedily when `temperature` is zero.
pub fn choose_move<R: Rng + ?Sized>(probs: &[f32], temperature: f32, rng: &mut R) -> usize {
    assert!(temperature >= 0.0);
    if temperature == 0.0 {
        let (idx, _p) = probs
            .iter()
            .enumerate()
            .max_by(|(_i1, p1), (_i2, p2)| p1.total_cmp(p2))
            .unwrap();
        return idx;
    }

    /* prob -> prob^(1/temperature) */
    let weights = probs
        .iter()
        .map(|p| p.max(0.0).powf(1.0 / temperature))
        .collect_vec();
    match WeightedIndex::new(&weights) {
        Ok(distribution) => distribution.sample(rng),
        /* all weights underflowed, fall back to greedy */
        Err(_) => choose_move(probs, 0.0, rng),
    }
}
