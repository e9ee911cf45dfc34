use crate::coach::config::CoachConfig;
use crate::coach::gating::GatingDecision;

/// Counters of the iteration loop, mutated only between phases.
///
/// `step` counts loop passes and never rewinds, it drives warm-up and the comparison
/// frequencies. `current_iteration` is the model version and goes back on a rejection.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationState {
    pub current_iteration: usize,
    pub step: usize,
    pub gating_retry_count: usize,
    pub warmup: bool,
    pub expert_value_weight: f32,
}

impl IterationState {
    pub fn new(start_iteration: usize, config: &CoachConfig) -> Self {
        Self {
            current_iteration: start_iteration,
            step: start_iteration.max(1),
            gating_retry_count: 0,
            warmup: false,
            expert_value_weight: config.expert_value_weight.start,
        }
    }

    pub fn is_done(&self, config: &CoachConfig) -> bool {
        self.current_iteration > config.num_iters
    }

    /// Enter a new loop pass.
    pub fn begin(&mut self, config: &CoachConfig) {
        self.warmup = self.step <= config.num_warmup_iters;
    }

    pub fn should_self_play(&self, config: &CoachConfig) -> bool {
        self.step > config.skip_self_play_iters
    }

    pub fn should_compare_baseline(&self, config: &CoachConfig) -> bool {
        !self.warmup
            && config.compare_with_baseline
            && (self.step - 1) % config.baseline_compare_freq == 0
    }

    pub fn should_compare_past(&self, config: &CoachConfig) -> bool {
        !self.warmup
            && config.compare_with_past
            && (self.step - 1) % config.past_compare_freq == 0
    }

    pub fn apply_gating(&mut self, decision: GatingDecision, past: usize) {
        match decision {
            GatingDecision::RetryHold => {
                self.current_iteration = past;
                self.gating_retry_count += 1;
            }
            GatingDecision::Accept | GatingDecision::Exhausted => self.gating_retry_count = 0,
        }
    }

    /// Close the loop pass: refresh the expert value weight and move both counters on.
    pub fn advance(&mut self, config: &CoachConfig) {
        self.expert_value_weight = config.expert_value_weight.at(self.step);
        self.current_iteration += 1;
        self.step += 1;
    }
}
