pub mod arena;
pub mod config;
pub mod gating;
pub mod paths;
pub mod state;

use crossbeam_channel::unbounded;
use std::sync::Arc;

use crate::coach::arena::{IArena, LocalArena, MatchResults, NetPlayer};
use crate::coach::config::CoachConfig;
use crate::coach::gating::{past_iteration, GatingDecision, GatingPolicy};
use crate::coach::paths::RunPaths;
use crate::coach::state::IterationState;
use crate::error::Result;
use crate::game::common::{GameColor, GamesResults, IGame, PlayerRand};
use crate::net::{IEstimator, TrainingSet};
use crate::selfplay::pool::{PhaseConfig, SelfPlayPhase};
use crate::selfplay::samples::SamplePipeline;
use crate::selfplay::simulator::{PolicySimulator, Simulator, SimulatorConfig};
use crate::util::summary::SummaryWriter;
use crate::util::Builder;

/// Drives the self-play, train, evaluate loop of one run.
///
/// `net` is the model being trained, `past_net` a second instance of the same estimator used
/// as the opponent in gating matches.
pub struct Coach<Game: IGame, Net: IEstimator> {
    game: Arc<Game>,
    net: Net,
    past_net: Net,
    config: CoachConfig,
    paths: RunPaths,
    state: IterationState,
    gating: GatingPolicy,
    summary: SummaryWriter,
    simulators: Box<dyn Builder<Box<dyn Simulator>>>,
    arena: Box<dyn IArena<Game>>,
}

impl<Game: IGame, Net: IEstimator> Coach<Game, Net> {
    pub fn new(game: Arc<Game>, mut net: Net, past_net: Net, mut config: CoachConfig) -> Result<Self> {
        config.validate()?;
        config.ensure_arena_mcts();
        let paths = RunPaths::new(&config);
        let start_iteration = restore(&mut net, &paths, config.load_model)?;
        let summary = SummaryWriter::new(&paths.summary)?;

        let simulator_config = SimulatorConfig {
            temperature: config.temp,
            temp_threshold: config.temp_threshold,
            max_moves: config.max_moves,
            symmetric_samples: config.symmetric_samples,
        };
        let simulator_game = Arc::clone(&game);
        let simulators = move || {
            Box::new(PolicySimulator::new(
                Arc::clone(&simulator_game),
                simulator_config.clone(),
            )) as Box<dyn Simulator>
        };
        let arena = LocalArena::new(Arc::clone(&game), config.arena_batch_size, config.max_moves);

        Ok(Self {
            game,
            net,
            past_net,
            state: IterationState::new(start_iteration, &config),
            gating: GatingPolicy::from_config(&config),
            paths,
            summary,
            simulators: Box::new(simulators),
            arena: Box::new(arena),
            config,
        })
    }

    pub fn with_simulators(mut self, simulators: Box<dyn Builder<Box<dyn Simulator>>>) -> Self {
        self.simulators = simulators;
        self
    }

    pub fn with_arena(mut self, arena: Box<dyn IArena<Game>>) -> Self {
        self.arena = arena;
        self
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn learn(&mut self) -> Result<()> {
        log::info!("Because of batching, it can take a long time before any games finish.");
        while !self.state.is_done(&self.config) {
            self.run_iteration()?;
        }
        Ok(())
    }

    /// One pass of the loop: self-play, train, compare, advance.
    pub fn run_iteration(&mut self) -> Result<()> {
        let iteration = self.state.current_iteration;
        let step = self.state.step;
        log::info!("------ITER {}------ (step {})", iteration, step);

        self.state.begin(&self.config);
        if self.state.warmup {
            log::info!("Warmup: random policy and value");
        }

        if self.state.should_self_play(&self.config) {
            let results = self.self_play(iteration)?;
            self.process_game_results(&results, step)?;
        }
        self.train(iteration)?;

        if self.state.should_compare_baseline(&self.config) {
            self.compare_to_baseline(iteration)?;
        }
        if self.state.should_compare_past(&self.config) {
            self.compare_to_past(iteration)?;
        }

        self.summary.add_scalar(
            "win_rate/model_version",
            self.state.current_iteration as f64,
            step,
        )?;
        self.state.advance(&self.config);
        Ok(())
    }

    /// Generate the samples of `iteration` with the current estimator.
    pub fn self_play(&mut self, iteration: usize) -> Result<GamesResults> {
        let files = self.paths.samples(iteration);
        let (samples_tx, samples_rx) = unbounded();
        let pipeline = SamplePipeline::spawn(
            &files,
            samples_rx,
            self.config.sample_save_interval(),
            self.game.observation_len(),
            self.game.action_size(),
        )?;

        let phase_config = PhaseConfig {
            workers: self.config.workers,
            capacity: self.config.process_batch_size,
            observation_len: self.game.observation_len(),
            action_size: self.game.action_size(),
            games_num: self.config.games_per_iteration,
            warmup: self.state.warmup,
            expert_value_weight: self.state.expert_value_weight,
            poll_interval: self.config.dispatch_poll_interval(),
        };
        let report = SelfPlayPhase::spawn(&phase_config, self.simulators.as_ref(), &samples_tx)
            .and_then(|phase| phase.run(&mut self.net));
        drop(samples_tx);
        /* stop the saver even when the phase failed, it flushes what was queued */
        let saved = pipeline.stop();
        /* a dead saver closes the queue under the workers, its error is the cause */
        let (report, saved) = match (report, saved) {
            (Err(err), Err(cause)) => {
                log::error!("Self-play stopped after the sample saver failed: {}", err);
                return Err(cause);
            }
            (report, saved) => (report?, saved?),
        };

        log::info!(
            "Saved {} samples for training, {} inference calls",
            saved,
            report.dispatch.calls
        );
        Ok(report.results)
    }

    fn process_game_results(&mut self, results: &GamesResults, step: usize) -> Result<()> {
        if results.games_num() == 0 {
            return Ok(());
        }
        let player1 = results.winrate(GameColor::Player1);
        let player2 = results.winrate(GameColor::Player2);
        let draws = results.draw_rate();
        log::info!(
            "Self-play results: player1 {:.3}, player2 {:.3}, draws {:.3}",
            player1,
            player2,
            draws
        );
        self.summary.add_scalar("win_rate/player1", player1 as f64, step)?;
        self.summary.add_scalar("win_rate/player2", player2 as f64, step)?;
        self.summary.add_scalar("win_rate/draws", draws as f64, step)?;
        Ok(())
    }

    /// Train on the sample window ending at `iteration` and write its checkpoint.
    pub fn train(&mut self, iteration: usize) -> Result<()> {
        let window = training_window(iteration, self.config.num_iters_for_train_examples_history);
        let sets = window
            .clone()
            .map(|i| {
                self.paths
                    .samples(i)
                    .load(self.game.observation_len(), self.game.action_size())
            })
            .collect::<Result<Vec<_>>>()?;
        let data = TrainingSet::concat(&sets)?;
        log::info!(
            "Training on {} samples of iterations {}..={}",
            data.len(),
            window.start(),
            window.end()
        );

        let losses = self.net.train(
            &data,
            self.config.train_steps_per_iteration,
            self.config.train_batch_size,
        )?;
        log::info!(
            "Losses: policy {:.4}, value {:.4}, total {:.4}",
            losses.policy,
            losses.value,
            losses.total()
        );
        self.summary.add_scalar("loss/policy", losses.policy as f64, iteration)?;
        self.summary.add_scalar("loss/value", losses.value as f64, iteration)?;
        self.summary.add_scalar("loss/total", losses.total() as f64, iteration)?;

        self.net.save_checkpoint(&self.paths.checkpoint(iteration))
    }

    pub fn compare_to_baseline(&mut self, iteration: usize) -> Result<MatchResults> {
        log::info!("PITTING AGAINST BASELINE: random player");
        let seed = self.config.arena_seed;
        let mut new_player = NetPlayer::new(&mut self.net, self.config.arena_temp, false, seed);
        let mut baseline = match seed {
            Some(seed) => PlayerRand::from_seed(seed.wrapping_add(2)),
            None => PlayerRand::new(),
        };
        let results = self.arena.play_matches(
            [&mut new_player, &mut baseline],
            self.config.arena_compare_baseline,
        )?;

        log::info!(
            "NEW/BASELINE WINS : {} / {} ; DRAWS : {}",
            results.wins[0],
            results.wins[1],
            results.draws
        );
        self.summary
            .add_scalar("win_rate/test", results.winrate(0) as f64, iteration)?;
        Ok(results)
    }

    /// Play the new model of `iteration` against the model it is gated on.
    ///
    /// Returns the past iteration and the match results, seat 0 being the new model.
    pub fn evaluate_against_past(&mut self, iteration: usize) -> Result<(usize, MatchResults)> {
        let past = past_iteration(iteration, self.config.past_compare_freq);
        self.past_net.load_checkpoint(&self.paths.checkpoint(past))?;
        log::info!("PITTING AGAINST ITERATION {}", past);

        let seed = self.config.arena_seed;
        let batched = self.config.arena_batched;
        let temperature = self.config.arena_temp;
        let mut new_player = NetPlayer::new(&mut self.net, temperature, batched, seed);
        let mut past_player = NetPlayer::new(
            &mut self.past_net,
            temperature,
            batched,
            seed.map(|seed| seed.wrapping_add(1)),
        );
        let results = self.arena.play_matches(
            [&mut new_player, &mut past_player],
            self.config.arena_compare,
        )?;
        log::info!(
            "NEW/PAST WINS : {} / {} ; DRAWS : {}",
            results.wins[0],
            results.wins[1],
            results.draws
        );
        Ok((past, results))
    }

    /// Gate the model of `iteration`, rolling back to the past model on a rejection.
    pub fn compare_to_past(&mut self, iteration: usize) -> Result<GatingDecision> {
        let (past, results) = self.evaluate_against_past(iteration)?;
        let winrate = results.winrate(0);
        self.summary
            .add_scalar("win_rate/past", winrate as f64, iteration)?;

        let decision = self.gating.decide(winrate, self.state.gating_retry_count);
        if !decision.is_promoted() {
            log::info!("Staying on model version {} (win rate {:.3})", past, winrate);
            self.net.load_checkpoint(&self.paths.checkpoint(past))?;
            self.paths.remove_checkpoint(iteration)?;
            if self.config.purge_rejected_samples {
                self.paths.samples(iteration).remove()?;
            }
        } else if decision == GatingDecision::Exhausted {
            log::warn!(
                "Model version {} below threshold ({:.3}) after {} retries, accepting it anyway",
                iteration,
                winrate,
                self.state.gating_retry_count
            );
        } else {
            log::info!("Accepting model version {} (win rate {:.3})", iteration, winrate);
        }
        self.state.apply_gating(decision, past);
        Ok(decision)
    }
}

/// Load the newest checkpoint of the run, or save `net` as iteration 0 when there is none.
///
/// Without `load_model` the run directories are wiped first, so a new run never appends to
/// the samples of an older one. Returns the first iteration to run.
fn restore<Net: IEstimator>(net: &mut Net, paths: &RunPaths, load_model: bool) -> Result<usize> {
    if !load_model {
        if paths.count_checkpoints()? > 0 {
            log::warn!(
                "Starting over, removing the previous run in {}",
                paths.checkpoints.display()
            );
        }
        paths.clear()?;
    }
    let existing = paths.count_checkpoints()?;
    if existing == 0 {
        net.save_checkpoint(&paths.checkpoint(0))?;
        return Ok(1);
    }
    net.load_checkpoint(&paths.checkpoint(existing - 1))?;
    log::info!("Resuming from iteration {}", existing);
    Ok(existing)
}

/// Iterations whose samples train model `iteration`.
pub fn training_window(iteration: usize, max_history: usize) -> std::ops::RangeInclusive<usize> {
    let history = ((iteration + 4) / 2).max(4).min(max_history);
    iteration.saturating_sub(history).max(1)..=iteration
}
