use crate::coach::config::CoachConfig;

/// Outcome of a new-vs-past comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatingDecision {
    /// The new model reached the threshold.
    Accept,
    /// Below threshold with retries left: roll back to the past model and train again.
    RetryHold,
    /// Below threshold but the retry budget is spent, the new model is promoted anyway.
    Exhausted,
}

impl GatingDecision {
    pub fn is_promoted(&self) -> bool {
        !matches!(self, GatingDecision::RetryHold)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GatingPolicy {
    pub enabled: bool,
    pub min_winrate: f32,
    pub max_retries: usize,
}

impl GatingPolicy {
    pub fn from_config(config: &CoachConfig) -> Self {
        Self {
            enabled: config.model_gating,
            min_winrate: config.min_next_model_winrate,
            max_retries: config.max_gating_iters,
        }
    }

    pub fn decide(&self, winrate: f32, retry_count: usize) -> GatingDecision {
        if !self.enabled || winrate >= self.min_winrate {
            GatingDecision::Accept
        } else if self.max_retries == 0 || retry_count >= self.max_retries {
            GatingDecision::Exhausted
        } else {
            GatingDecision::RetryHold
        }
    }
}

/// The iteration a freshly trained model `iteration` is compared against.
pub fn past_iteration(iteration: usize, past_compare_freq: usize) -> usize {
    iteration.saturating_sub(past_compare_freq)
}
