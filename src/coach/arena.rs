use itertools::Itertools;
use ndarray::Array2;
use rand::prelude::*;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::game::common::{choose_move, mask_policy, GameColor, GameOutcome, GamePlayer, IGame};
use crate::net::IEstimator;

/// Results of a match, indexed by the players' seat in the `players` array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchResults {
    pub wins: [u32; 2],
    pub draws: u32,
}

impl MatchResults {
    pub fn games_num(&self) -> u32 {
        self.wins.iter().sum::<u32>() + self.draws
    }

    /// `(wins + 0.5 * draws) / games`, zero when no game was played.
    pub fn winrate(&self, player: usize) -> f32 {
        let games = self.games_num();
        if games == 0 {
            return 0.0;
        }
        (self.wins[player] as f32 + 0.5 * self.draws as f32) / games as f32
    }

    pub fn winrates(&self) -> [f32; 2] {
        [self.winrate(0), self.winrate(1)]
    }
}

/// Head to head match simulator.
pub trait IArena<Game: IGame> {
    fn play_matches(
        &mut self,
        players: [&mut dyn GamePlayer<Game>; 2],
        games_num: usize,
    ) -> Result<MatchResults>;
}

/// Plays up to `batch_size` games in lockstep, the first player alternating between games.
pub struct LocalArena<Game: IGame> {
    game: Arc<Game>,
    batch_size: usize,
    max_moves: usize,
}

struct ArenaGame<S> {
    state: S,
    /* seat of the player holding Player1 */
    first: usize,
    moves_num: usize,
    outcome: Option<GameOutcome>,
}

impl<S> ArenaGame<S> {
    fn seat_of(&self, color: GameColor) -> usize {
        match color {
            GameColor::Player1 => self.first,
            GameColor::Player2 => 1 - self.first,
        }
    }
}

impl<Game: IGame> LocalArena<Game> {
    pub fn new(game: Arc<Game>, batch_size: usize, max_moves: usize) -> Self {
        assert!(batch_size > 0);
        Self {
            game,
            batch_size,
            max_moves,
        }
    }

    fn play_batch(
        &self,
        players: &mut [&mut dyn GamePlayer<Game>; 2],
        first_game: usize,
        games_num: usize,
        results: &mut MatchResults,
    ) -> Result<()> {
        let game = &*self.game;
        let mut games = (first_game..first_game + games_num)
            .map(|idx| ArenaGame {
                state: game.initial_state(),
                first: idx % 2,
                moves_num: 0,
                outcome: None,
            })
            .collect_vec();

        while games.iter().any(|g| g.outcome.is_none()) {
            for seat in 0..2 {
                let to_move = games
                    .iter()
                    .positions(|g| {
                        g.outcome.is_none() && g.seat_of(game.current_player(&g.state)) == seat
                    })
                    .collect_vec();
                if to_move.is_empty() {
                    continue;
                }

                let moves = {
                    let states = to_move.iter().map(|idx| &games[*idx].state).collect_vec();
                    players[seat].next_moves(game, &states)?
                };
                if moves.len() != to_move.len() {
                    return Err(Error::Arena {
                        reason: format!(
                            "player {} returned {} moves for {} positions",
                            seat,
                            moves.len(),
                            to_move.len()
                        ),
                    });
                }

                for (idx, action) in to_move.into_iter().zip(moves) {
                    let g = &mut games[idx];
                    if !game.legal_moves(&g.state).get(action).copied().unwrap_or(false) {
                        return Err(Error::Arena {
                            reason: format!("player {seat} played illegal move {action}"),
                        });
                    }
                    g.state = game.apply_move(&g.state, action);
                    g.moves_num += 1;
                    g.outcome = match game.terminal_result(&g.state) {
                        Some(outcome) => Some(outcome),
                        None if g.moves_num >= self.max_moves => Some(GameOutcome::Draw),
                        None => None,
                    };
                }
            }
        }

        for g in games {
            match g.outcome {
                Some(GameOutcome::Win(color)) => results.wins[g.seat_of(color)] += 1,
                Some(GameOutcome::Draw) | None => results.draws += 1,
            }
        }
        Ok(())
    }
}

impl<Game: IGame> IArena<Game> for LocalArena<Game> {
    fn play_matches(
        &mut self,
        mut players: [&mut dyn GamePlayer<Game>; 2],
        games_num: usize,
    ) -> Result<MatchResults> {
        let mut results = MatchResults::default();
        let mut played = 0;
        while played < games_num {
            let batch = (games_num - played).min(self.batch_size);
            self.play_batch(&mut players, played, batch, &mut results)?;
            played += batch;
        }
        Ok(results)
    }
}

/// Plays from the estimator's masked policy, sampled at `temperature`.
///
/// In batched mode all positions of a call go through one inference, otherwise every
/// position is evaluated on its own.
pub struct NetPlayer<'a> {
    net: &'a mut dyn IEstimator,
    temperature: f32,
    batched: bool,
    rand: StdRng,
}

impl<'a> NetPlayer<'a> {
    pub fn new(net: &'a mut dyn IEstimator, temperature: f32, batched: bool, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        Self {
            net,
            temperature,
            batched,
            rand: StdRng::seed_from_u64(seed),
        }
    }

    fn evaluate<Game: IGame>(&mut self, game: &Game, states: &[&Game::State]) -> Result<Array2<f32>> {
        let rows = states.len();
        let cols = game.observation_len();
        let data = states
            .iter()
            .flat_map(|state| game.canonical_observation(state))
            .collect_vec();
        let got = data.len();
        let observations = Array2::from_shape_vec((rows, cols), data).map_err(|_| {
            Error::InferenceShape {
                expected: (rows, cols),
                got: (rows, got / rows.max(1)),
            }
        })?;
        let (policy, _value) = self.net.infer(observations.view())?;
        if policy.dim() != (rows, game.action_size()) {
            return Err(Error::InferenceShape {
                expected: (rows, game.action_size()),
                got: policy.dim(),
            });
        }
        Ok(policy)
    }
}

impl<Game: IGame> GamePlayer<Game> for NetPlayer<'_> {
    fn next_moves(&mut self, game: &Game, states: &[&Game::State]) -> Result<Vec<usize>> {
        let policies = if self.batched {
            self.evaluate(game, states)?
                .outer_iter()
                .map(|row| row.to_vec())
                .collect_vec()
        } else {
            states
                .iter()
                .map(|state| Ok(self.evaluate(game, &[*state])?.row(0).to_vec()))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(states
            .iter()
            .zip(policies)
            .map(|(state, policy)| {
                let probs = mask_policy(&policy, &game.legal_moves(state));
                choose_move(&probs, self.temperature, &mut self.rand)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::common::PlayerRand;
    use crate::net::linear::LinearNet;
    use crate::ttt::ttt_game::{TttGame, TttPosition};

    /// Always plays the lowest legal index.
    struct FirstLegal;

    impl<Game: IGame> GamePlayer<Game> for FirstLegal {
        fn next_moves(&mut self, game: &Game, states: &[&Game::State]) -> Result<Vec<usize>> {
            Ok(states
                .iter()
                .map(|s| game.legal_moves(s).iter().position(|legal| *legal).unwrap())
                .collect())
        }
    }

    #[test]
    fn alternating_first_player() {
        /* deterministic play: the first mover wins with the top row every time */
        let mut arena = LocalArena::new(Arc::new(TttGame), 3, 128);
        let (mut a, mut b) = (FirstLegal, FirstLegal);
        let results = arena.play_matches([&mut a, &mut b], 10).unwrap();
        assert_eq!(results.games_num(), 10);
        assert_eq!(results.wins, [5, 5]);
        assert_eq!(results.winrates(), [0.5, 0.5]);
    }

    #[test]
    fn max_moves_adjudicates_draws() {
        let mut arena = LocalArena::new(Arc::new(TttGame), 4, 2);
        let (mut a, mut b) = (PlayerRand::from_seed(1), PlayerRand::from_seed(2));
        let results = arena.play_matches([&mut a, &mut b], 6).unwrap();
        assert_eq!(results.draws, 6);
        assert_eq!(results.winrate(0), 0.5);
    }

    #[test]
    fn illegal_moves_are_rejected() {
        struct Stubborn;
        impl GamePlayer<TttGame> for Stubborn {
            fn next_moves(&mut self, _game: &TttGame, states: &[&TttPosition]) -> Result<Vec<usize>> {
                Ok(vec![4; states.len()])
            }
        }
        let mut arena = LocalArena::new(Arc::new(TttGame), 2, 128);
        let (mut a, mut b) = (Stubborn, Stubborn);
        assert!(matches!(
            arena.play_matches([&mut a, &mut b], 2),
            Err(Error::Arena { .. })
        ));
    }

    #[test]
    fn seeded_net_players_are_reproducible() {
        let play = |batched: bool| {
            let mut net1 = LinearNet::new(9, 9, 0.1);
            let mut net2 = LinearNet::new(9, 9, 0.1);
            let mut p1 = NetPlayer::new(&mut net1, 1.0, batched, Some(3));
            let mut p2 = NetPlayer::new(&mut net2, 1.0, batched, Some(4));
            let mut arena = LocalArena::new(Arc::new(TttGame), 8, 128);
            arena.play_matches([&mut p1, &mut p2], 16).unwrap()
        };
        let results = play(true);
        assert_eq!(results.games_num(), 16);
        assert_eq!(results, play(true));
        assert_eq!(results, play(false));
    }

    #[test]
    fn empty_match() {
        let results = MatchResults::default();
        assert_eq!(results.winrate(0), 0.0);
    }
}
