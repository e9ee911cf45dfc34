use crossbeam_channel::Sender;
use itertools::Itertools;
use ndarray::ArrayView1;
use rand::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::game::common::{choose_move, mask_policy, GameColor, GameOutcome, GamesResults, IGame};
use crate::selfplay::samples::SampleRecord;
use crate::selfplay::slot::SlotClient;

/// Everything a simulator shares with the rest of its self-play phase.
pub struct PhaseContext {
    pub worker_id: usize,
    /// Games this worker has to play.
    pub games_num: usize,
    pub warmup: bool,
    pub expert_value_weight: f32,
    pub samples: Sender<SampleRecord>,
    pub games_played: Arc<AtomicUsize>,
    pub results: Arc<Mutex<GamesResults>>,
}

impl PhaseContext {
    pub fn send_sample(&self, record: SampleRecord) -> Result<()> {
        self.samples.send(record).map_err(|_| Error::Worker {
            worker_id: self.worker_id,
            reason: "sample queue closed".to_string(),
        })
    }

    pub fn record_game(&self, outcome: GameOutcome) {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(outcome);
        self.games_played.fetch_add(1, Ordering::SeqCst);
    }
}

/// Game playing unit attached to one worker slot.
///
/// Plays `ctx.games_num` games, getting every estimator evaluation through `client`.
pub trait Simulator: Send {
    fn run(&mut self, client: &mut SlotClient, ctx: &PhaseContext) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub temperature: f32,
    /// Moves played with `temperature`, greedy afterwards.
    pub temp_threshold: usize,
    /// Games longer than this are adjudicated as draws.
    pub max_moves: usize,
    pub symmetric_samples: bool,
}

/// Plays `capacity` games in lockstep, one slot submission per move.
///
/// During warm-up the estimator is not consulted, moves are uniform over the legal ones and
/// the predicted value is zero.
pub struct PolicySimulator<Game: IGame> {
    game: Arc<Game>,
    config: SimulatorConfig,
    rand: StdRng,
}

struct GameTrack<S> {
    state: S,
    moves_num: usize,
    /* observation, masked policy, player to move, predicted value */
    history: Vec<(Vec<f32>, Vec<f32>, GameColor, f32)>,
    done: bool,
}

impl<Game: IGame> PolicySimulator<Game> {
    pub fn new(game: Arc<Game>, config: SimulatorConfig) -> Self {
        Self::from_seed(game, config, rand::thread_rng().gen())
    }

    pub fn from_seed(game: Arc<Game>, config: SimulatorConfig, seed: u64) -> Self {
        Self {
            game,
            config,
            rand: StdRng::seed_from_u64(seed),
        }
    }

    fn play_batch(
        &mut self,
        games_num: usize,
        client: &mut SlotClient,
        ctx: &PhaseContext,
    ) -> Result<()> {
        let game = Arc::clone(&self.game);
        let action_size = game.action_size();
        let mut tracks = (0..games_num)
            .map(|_| GameTrack {
                state: game.initial_state(),
                moves_num: 0,
                history: Vec::new(),
                done: false,
            })
            .collect_vec();

        while tracks.iter().any(|t| !t.done) {
            let observations = tracks
                .iter()
                .map(|t| (!t.done).then(|| game.canonical_observation(&t.state)))
                .collect_vec();

            let (policies, values): (Vec<Vec<f32>>, Vec<f32>) = if ctx.warmup {
                (
                    vec![vec![1.0; action_size]; games_num],
                    vec![0.0; games_num],
                )
            } else {
                client.submit(|mut input| {
                    input.fill(0.0);
                    for (row, obs) in observations.iter().enumerate() {
                        if let Some(obs) = obs {
                            input.row_mut(row).assign(&ArrayView1::from(obs.as_slice()));
                        }
                    }
                })?;
                client.collect(|policy, value| {
                    (0..games_num)
                        .map(|row| (policy.row(row).to_vec(), value[row]))
                        .unzip()
                })?
            };

            for (idx, track) in tracks.iter_mut().enumerate() {
                let Some(observation) = observations[idx].clone() else {
                    continue;
                };
                let legal = game.legal_moves(&track.state);
                let probs = mask_policy(&policies[idx], &legal);
                let temperature = if track.moves_num < self.config.temp_threshold {
                    self.config.temperature
                } else {
                    0.0
                };
                let action = choose_move(&probs, temperature, &mut self.rand);

                let player = game.current_player(&track.state);
                track.history.push((observation, probs, player, values[idx]));
                track.state = game.apply_move(&track.state, action);
                track.moves_num += 1;

                let outcome = match game.terminal_result(&track.state) {
                    Some(outcome) => Some(outcome),
                    None if track.moves_num >= self.config.max_moves => Some(GameOutcome::Draw),
                    None => None,
                };
                if let Some(outcome) = outcome {
                    track.done = true;
                    self.emit_samples(std::mem::take(&mut track.history), outcome, ctx)?;
                    ctx.record_game(outcome);
                    log::debug!(
                        "Worker {} finished a game: {:?} after {} moves",
                        ctx.worker_id,
                        outcome,
                        track.moves_num
                    );
                }
            }
        }
        Ok(())
    }

    fn emit_samples(
        &self,
        history: Vec<(Vec<f32>, Vec<f32>, GameColor, f32)>,
        outcome: GameOutcome,
        ctx: &PhaseContext,
    ) -> Result<()> {
        let w = ctx.expert_value_weight;
        for (observation, policy, player, predicted) in history {
            let value = (1.0 - w) * outcome.score_for(player) + w * predicted;
            if self.config.symmetric_samples {
                for (observation, policy) in self.game.symmetries(&observation, &policy) {
                    ctx.send_sample(SampleRecord {
                        observation,
                        policy,
                        value,
                    })?;
                }
            } else {
                ctx.send_sample(SampleRecord {
                    observation,
                    policy,
                    value,
                })?;
            }
        }
        Ok(())
    }
}

impl<Game: IGame> Simulator for PolicySimulator<Game> {
    fn run(&mut self, client: &mut SlotClient, ctx: &PhaseContext) -> Result<()> {
        let capacity = client.capacity();
        let mut remaining = ctx.games_num;
        while remaining > 0 {
            let games_num = remaining.min(capacity);
            self.play_batch(games_num, client, ctx)?;
            remaining -= games_num;
        }
        Ok(())
    }
}
