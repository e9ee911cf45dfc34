use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::net::{IEstimator, Losses, TrainingSet};

/// Two headed linear estimator: a softmax policy head and a tanh value head.
///
/// Small enough to train on the CPU inside the coach process, used by the `coach` binary
/// and the tests in place of a real network.
#[derive(Clone, Debug)]
pub struct LinearNet {
    policy_weights: Array2<f32>,
    policy_bias: Array1<f32>,
    value_weights: Array1<f32>,
    value_bias: f32,
    lr: f32,
    rng: StdRng,
}

impl LinearNet {
    pub fn new(observation_len: usize, action_size: usize, lr: f32) -> Self {
        Self {
            policy_weights: Array2::zeros((observation_len, action_size)),
            policy_bias: Array1::zeros(action_size),
            value_weights: Array1::zeros(observation_len),
            value_bias: 0.0,
            lr,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn observation_len(&self) -> usize {
        self.policy_weights.nrows()
    }

    pub fn action_size(&self) -> usize {
        self.policy_weights.ncols()
    }

    fn forward(&self, observations: ArrayView2<f32>) -> (Array2<f32>, Array1<f32>) {
        let mut policy = observations.dot(&self.policy_weights) + &self.policy_bias;
        for mut row in policy.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|x| (x - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|x| x / sum);
        }
        let value = (observations.dot(&self.value_weights) + self.value_bias).mapv(f32::tanh);
        (policy, value)
    }
}

impl IEstimator for LinearNet {
    fn infer(&mut self, observations: ArrayView2<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
        if observations.ncols() != self.observation_len() {
            return Err(Error::InferenceShape {
                expected: (observations.nrows(), self.observation_len()),
                got: observations.dim(),
            });
        }
        Ok(self.forward(observations))
    }

    fn train(&mut self, data: &TrainingSet, steps: usize, batch_size: usize) -> Result<Losses> {
        if data.is_empty() {
            return Err(Error::Training {
                reason: "no training samples".to_string(),
            });
        }
        if data.observations.ncols() != self.observation_len()
            || data.policies.ncols() != self.action_size()
        {
            return Err(Error::Training {
                reason: format!(
                    "samples of shape ({}, {}) do not fit estimator ({}, {})",
                    data.observations.ncols(),
                    data.policies.ncols(),
                    self.observation_len(),
                    self.action_size()
                ),
            });
        }

        let mut total = Losses::default();
        for _ in 0..steps {
            let (x, target_pi, target_v) = data.sample_batch(&mut self.rng, batch_size);
            let n = x.nrows() as f32;
            let (pi, v) = self.forward(x.view());

            total.policy += -(&target_pi * &pi.mapv(|p| p.max(1e-8).ln())).sum() / n;
            total.value += (&v - &target_v).mapv(|d| d * d).sum() / n;

            /* cross entropy through softmax */
            let grad_logits = (&pi - &target_pi) / n;
            let grad_policy_weights = x.t().dot(&grad_logits);
            let grad_policy_bias = grad_logits.sum_axis(Axis(0));

            /* squared error through tanh */
            let grad_z = (&v - &target_v) * &v.mapv(|v| 1.0 - v * v) * (2.0 / n);
            let grad_value_weights = x.t().dot(&grad_z);
            let grad_value_bias = grad_z.sum();

            self.policy_weights.scaled_add(-self.lr, &grad_policy_weights);
            self.policy_bias.scaled_add(-self.lr, &grad_policy_bias);
            self.value_weights.scaled_add(-self.lr, &grad_value_weights);
            self.value_bias -= self.lr * grad_value_bias;
        }

        let steps = steps.max(1) as f32;
        Ok(Losses {
            policy: total.policy / steps,
            value: total.value / steps,
        })
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                fs::create_dir_all(dir)?;
            }
        }
        let checkpoint = json::object! {
            observation_len: self.observation_len(),
            action_size: self.action_size(),
            policy_weights: self.policy_weights.iter().copied().collect_vec(),
            policy_bias: self.policy_bias.to_vec(),
            value_weights: self.value_weights.to_vec(),
            value_bias: self.value_bias,
        };
        fs::write(path, checkpoint.dump())?;
        Ok(())
    }

    fn load_checkpoint(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::MissingCheckpoint {
                path: path.to_path_buf(),
            });
        }
        let corrupt = |reason: String| Error::CorruptCheckpoint {
            path: path.to_path_buf(),
            reason,
        };
        let obj = json::parse(&fs::read_to_string(path)?).map_err(|err| corrupt(err.to_string()))?;

        let observation_len = obj["observation_len"].as_usize();
        let action_size = obj["action_size"].as_usize();
        if observation_len != Some(self.observation_len()) || action_size != Some(self.action_size())
        {
            return Err(corrupt(format!(
                "checkpoint shape {:?}x{:?} does not match {}x{}",
                observation_len,
                action_size,
                self.observation_len(),
                self.action_size()
            )));
        }

        let floats = |key: &str, len: usize| -> Result<Vec<f32>> {
            let values = obj[key]
                .members()
                .map(|v| v.as_f32())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| corrupt(format!("non numeric entry in '{key}'")))?;
            if values.len() != len {
                return Err(corrupt(format!(
                    "'{key}' has {} entries, expected {len}",
                    values.len()
                )));
            }
            Ok(values)
        };
        let (rows, cols) = (self.observation_len(), self.action_size());
        let policy_weights = Array2::from_shape_vec((rows, cols), floats("policy_weights", rows * cols)?)
            .map_err(|err| corrupt(err.to_string()))?;
        let policy_bias = Array1::from_vec(floats("policy_bias", cols)?);
        let value_weights = Array1::from_vec(floats("value_weights", rows)?);
        let value_bias = obj["value_bias"]
            .as_f32()
            .ok_or_else(|| corrupt("missing 'value_bias'".to_string()))?;

        self.policy_weights = policy_weights;
        self.policy_bias = policy_bias;
        self.value_weights = value_weights;
        self.value_bias = value_bias;
        Ok(())
    }
}
