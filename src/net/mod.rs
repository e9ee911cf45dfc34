pub mod linear;
mod linear_test;

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::seq::index;
use rand::Rng;
use std::path::Path;

use crate::error::{Error, Result};

/// Policy/value estimator used for self-play inference, training and evaluation.
pub trait IEstimator: Send {
    /// Evaluate a batch of flattened observations, one per row.
    ///
    /// Returns a `[rows, action_size]` probability matrix and a `[rows]` value vector.
    fn infer(&mut self, observations: ArrayView2<f32>) -> Result<(Array2<f32>, Array1<f32>)>;

    fn train(&mut self, data: &TrainingSet, steps: usize, batch_size: usize) -> Result<Losses>;

    fn save_checkpoint(&self, path: &Path) -> Result<()>;

    fn load_checkpoint(&mut self, path: &Path) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Losses {
    pub policy: f32,
    pub value: f32,
}

impl Losses {
    pub fn total(&self) -> f32 {
        self.policy + self.value
    }
}

/// Row aligned training samples.
#[derive(Clone, Debug)]
pub struct TrainingSet {
    pub observations: Array2<f32>,
    pub policies: Array2<f32>,
    pub values: Array1<f32>,
}

impl TrainingSet {
    pub fn new(
        observations: Array2<f32>,
        policies: Array2<f32>,
        values: Array1<f32>,
    ) -> Result<Self> {
        let rows = observations.nrows();
        if policies.nrows() != rows || values.len() != rows {
            return Err(Error::Training {
                reason: format!(
                    "misaligned samples: {} observations, {} policies, {} values",
                    rows,
                    policies.nrows(),
                    values.len()
                ),
            });
        }
        Ok(Self {
            observations,
            policies,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stack several sets into one, preserving order.
    pub fn concat(sets: &[TrainingSet]) -> Result<Self> {
        if sets.is_empty() {
            return Err(Error::Training {
                reason: "no training samples".to_string(),
            });
        }
        let shape_err = |err: ndarray::ShapeError| Error::Training {
            reason: err.to_string(),
        };
        let observations = sets.iter().map(|s| s.observations.view()).collect::<Vec<_>>();
        let policies = sets.iter().map(|s| s.policies.view()).collect::<Vec<_>>();
        let values = sets.iter().map(|s| s.values.view()).collect::<Vec<_>>();
        Self::new(
            concatenate(Axis(0), &observations).map_err(shape_err)?,
            concatenate(Axis(0), &policies).map_err(shape_err)?,
            concatenate(Axis(0), &values).map_err(shape_err)?,
        )
    }

    /// Draw a minibatch of at most `batch_size` distinct rows.
    pub fn sample_batch<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
    ) -> (Array2<f32>, Array2<f32>, Array1<f32>) {
        let amount = batch_size.min(self.len());
        let indices = index::sample(rng, self.len(), amount).into_vec();
        (
            self.observations.select(Axis(0), &indices),
            self.policies.select(Axis(0), &indices),
            self.values.select(Axis(0), &indices),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_set(rows: usize, offset: f32) -> TrainingSet {
        let observations =
            Array::from_shape_fn((rows, 2), |(r, c)| offset + r as f32 * 2.0 + c as f32);
        let policies = Array::from_shape_fn((rows, 3), |(r, _)| offset + r as f32);
        let values = Array::from_shape_fn(rows, |r| offset + r as f32);
        TrainingSet::new(observations, policies, values).unwrap()
    }

    #[test]
    fn misaligned_rejected() {
        let res = TrainingSet::new(
            Array2::zeros((2, 2)),
            Array2::zeros((3, 2)),
            Array1::zeros(2),
        );
        assert!(matches!(res, Err(Error::Training { .. })));
    }

    #[test]
    fn concat_preserves_order() {
        let set = TrainingSet::concat(&[make_set(2, 0.0), make_set(3, 100.0)]).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.values, array![0.0, 1.0, 100.0, 101.0, 102.0]);
        assert_eq!(set.observations.row(2).to_vec(), vec![100.0, 101.0]);
        assert!(TrainingSet::concat(&[]).is_err());
    }

    #[test]
    fn batches_keep_rows_aligned() {
        let set = make_set(50, 0.0);
        let mut rng = StdRng::seed_from_u64(7);
        let (obs, policies, values) = set.sample_batch(&mut rng, 16);
        assert_eq!(obs.nrows(), 16);
        for r in 0..16 {
            assert_eq!(obs[[r, 0]], values[r] * 2.0);
            assert_eq!(policies[[r, 2]], values[r]);
        }

        let (_, _, values) = set.sample_batch(&mut rng, 500);
        assert_eq!(values.len(), 50);
    }
}
