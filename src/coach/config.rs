use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Schedule of the weight mixing the predicted value into the value target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpertValueWeight {
    pub start: f32,
    pub end: f32,
    /// Steps over which the weight ramps from `start` to `end`.
    pub iterations: usize,
}

impl Default for ExpertValueWeight {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 0.0,
            iterations: 35,
        }
    }
}

impl ExpertValueWeight {
    /// `start + (end - start) * min(step, iterations) / iterations`, `end` when there is no ramp.
    pub fn at(&self, step: usize) -> f32 {
        if self.iterations == 0 {
            return self.end;
        }
        let progress = step.min(self.iterations) as f32 / self.iterations as f32;
        self.start + (self.end - self.start) * progress
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub run_name: String,
    pub workers: usize,
    pub num_iters: usize,
    /// Games each worker plays in lockstep, the row count of one inference batch.
    pub process_batch_size: usize,
    pub train_batch_size: usize,
    pub arena_batch_size: usize,
    pub train_steps_per_iteration: usize,
    pub games_per_iteration: usize,
    pub num_iters_for_train_examples_history: usize,
    pub max_moves: usize,
    pub num_warmup_iters: usize,
    pub skip_self_play_iters: usize,
    pub symmetric_samples: bool,
    pub temp_threshold: usize,
    pub temp: f32,

    pub compare_with_baseline: bool,
    pub arena_compare_baseline: usize,
    pub arena_compare: usize,
    pub arena_temp: f32,
    pub arena_mcts: bool,
    pub arena_batched: bool,
    pub arena_seed: Option<u64>,
    pub baseline_compare_freq: usize,
    pub compare_with_past: bool,
    pub past_compare_freq: usize,

    pub model_gating: bool,
    pub max_gating_iters: usize,
    pub min_next_model_winrate: f32,
    /// Delete the self-play samples of a rejected iteration.
    pub purge_rejected_samples: bool,

    /// Seconds between two drains of the sample queue.
    pub sample_save_interval: f64,
    /// Seconds the dispatcher waits on the ready queue before reporting progress.
    pub dispatch_poll_interval: f64,
    pub expert_value_weight: ExpertValueWeight,

    pub load_model: bool,
    pub checkpoint: PathBuf,
    pub data: PathBuf,
    pub runs: PathBuf,
    pub lr: f32,
}

impl Default for CoachConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self {
            run_name: "default".to_string(),
            workers: cpus.saturating_sub(1).max(1),
            num_iters: 1000,
            process_batch_size: 64,
            train_batch_size: 512,
            arena_batch_size: 32,
            train_steps_per_iteration: 256,
            games_per_iteration: 64 * cpus,
            num_iters_for_train_examples_history: 10,
            max_moves: 128,
            num_warmup_iters: 2,
            skip_self_play_iters: 0,
            symmetric_samples: true,
            temp_threshold: 32,
            temp: 1.0,
            compare_with_baseline: true,
            arena_compare_baseline: 16,
            arena_compare: 128,
            arena_temp: 0.1,
            arena_mcts: true,
            arena_batched: true,
            arena_seed: None,
            baseline_compare_freq: 1,
            compare_with_past: true,
            past_compare_freq: 1,
            model_gating: true,
            max_gating_iters: 3,
            min_next_model_winrate: 0.52,
            purge_rejected_samples: false,
            sample_save_interval: 30.0,
            dispatch_poll_interval: 1.0,
            expert_value_weight: ExpertValueWeight::default(),
            load_model: true,
            checkpoint: PathBuf::from("checkpoint"),
            data: PathBuf::from("data"),
            runs: PathBuf::from("runs"),
            lr: 0.005,
        }
    }
}

impl CoachConfig {
    /// Read a JSON config, options missing from the file keep their default.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self =
            serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
                Error::ConfigParse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::Config {
                reason: reason.to_string(),
            })
        };
        if self.run_name.is_empty() {
            return invalid("run_name must not be empty");
        }
        for (name, value) in [
            ("workers", self.workers),
            ("process_batch_size", self.process_batch_size),
            ("train_batch_size", self.train_batch_size),
            ("arena_batch_size", self.arena_batch_size),
            ("train_steps_per_iteration", self.train_steps_per_iteration),
            ("games_per_iteration", self.games_per_iteration),
            ("num_iters_for_train_examples_history", self.num_iters_for_train_examples_history),
            ("max_moves", self.max_moves),
            ("baseline_compare_freq", self.baseline_compare_freq),
            ("past_compare_freq", self.past_compare_freq),
        ] {
            if value == 0 {
                return invalid(&format!("{name} must be positive"));
            }
        }
        if !(0.0..=1.0).contains(&self.min_next_model_winrate) {
            return invalid("min_next_model_winrate must be within [0, 1]");
        }
        if !(self.temp >= 0.0 && self.arena_temp >= 0.0) {
            return invalid("temperatures must be non negative");
        }
        for (name, value) in [
            ("sample_save_interval", self.sample_save_interval),
            ("dispatch_poll_interval", self.dispatch_poll_interval),
        ] {
            if !(value > 0.0) || Duration::try_from_secs_f64(value).is_err() {
                return invalid(&format!("{name} must be a positive number of seconds"));
            }
        }
        if !(self.lr > 0.0) {
            return invalid("lr must be positive");
        }
        Ok(())
    }

    /// Batched arena play needs the arena's search mode, switch it on when it is off.
    ///
    /// Returns whether the configuration was changed.
    pub fn ensure_arena_mcts(&mut self) -> bool {
        if self.arena_batched && !self.arena_mcts {
            log::warn!(
                "Batched arena comparison is enabled which uses MCTS, but arena_mcts is off. \
                 Continuing with MCTS in the arena."
            );
            self.arena_mcts = true;
            return true;
        }
        false
    }

    pub fn sample_save_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sample_save_interval)
    }

    pub fn dispatch_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.dispatch_poll_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = CoachConfig::default();
        config.validate().unwrap();
        assert!(config.workers >= 1);
        assert_eq!(config.min_next_model_winrate, 0.52);
        assert_eq!(config.max_gating_iters, 3);
        assert_eq!(config.expert_value_weight.iterations, 35);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"run_name": "ttt", "workers": 4, "arena_seed": 7,
                 "expert_value_weight": {{"end": 0.5}}}}"#
        )
        .unwrap();

        let config = CoachConfig::from_file(&path).unwrap();
        assert_eq!(config.run_name, "ttt");
        assert_eq!(config.workers, 4);
        assert_eq!(config.arena_seed, Some(7));
        assert_eq!(config.expert_value_weight.start, 0.0);
        assert_eq!(config.expert_value_weight.end, 0.5);
        assert_eq!(config.expert_value_weight.iterations, 35);
        assert_eq!(config.arena_compare, 128);
    }

    #[test]
    fn parse_and_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ workers: ").unwrap();
        assert!(matches!(
            CoachConfig::from_file(&path),
            Err(Error::ConfigParse { .. })
        ));

        std::fs::write(&path, r#"{"past_compare_freq": 0}"#).unwrap();
        assert!(matches!(
            CoachConfig::from_file(&path),
            Err(Error::Config { .. })
        ));

        let config = CoachConfig {
            min_next_model_winrate: 1.5,
            ..CoachConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn intervals_must_fit_a_duration() {
        for (sample_save_interval, dispatch_poll_interval) in
            [(1e20, 1.0), (30.0, f64::INFINITY), (f64::NAN, 1.0), (30.0, 0.0)]
        {
            let config = CoachConfig {
                sample_save_interval,
                dispatch_poll_interval,
                ..CoachConfig::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config { .. })));
        }
        let config = CoachConfig {
            sample_save_interval: 0.25,
            ..CoachConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.sample_save_interval(), Duration::from_millis(250));
    }

    #[test]
    fn batched_arena_forces_mcts() {
        let mut config = CoachConfig {
            arena_batched: true,
            arena_mcts: false,
            ..CoachConfig::default()
        };
        assert!(config.ensure_arena_mcts());
        assert!(config.arena_mcts);
        assert!(!config.ensure_arena_mcts());

        let mut unbatched = CoachConfig {
            arena_batched: false,
            arena_mcts: false,
            ..CoachConfig::default()
        };
        assert!(!unbatched.ensure_arena_mcts());
        assert!(!unbatched.arena_mcts);
    }

    #[test]
    fn expert_value_weight_ramp() {
        let schedule = ExpertValueWeight {
            start: 0.0,
            end: 1.0,
            iterations: 4,
        };
        let weights = (0..10).map(|step| schedule.at(step)).collect::<Vec<_>>();
        assert!(weights.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(weights[2], 0.5);
        assert!(weights[4..].iter().all(|w| *w == 1.0));

        let no_ramp = ExpertValueWeight {
            start: 0.2,
            end: 0.7,
            iterations: 0,
        };
        assert_eq!(no_ramp.at(0), 0.7);
    }
}
