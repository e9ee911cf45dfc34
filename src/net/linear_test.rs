#[cfg(test)]
mod tests {
    use ndarray::{array, Array1, Array2};

    use crate::error::Error;
    use crate::net::linear::LinearNet;
    use crate::net::{IEstimator, TrainingSet};

    #[test]
    fn fresh_net_is_uniform() {
        let mut net = LinearNet::new(4, 3, 0.1);
        let (policy, value) = net.infer(Array2::ones((2, 4)).view()).unwrap();
        assert_eq!(policy.dim(), (2, 3));
        assert_eq!(value.len(), 2);
        for p in policy.iter() {
            assert!((p - 1.0 / 3.0).abs() < 1e-6);
        }
        assert!(value.iter().all(|v| *v == 0.0));

        let err = net.infer(Array2::ones((2, 5)).view()).unwrap_err();
        assert!(matches!(err, Error::InferenceShape { .. }));
    }

    #[test]
    fn training_reduces_loss() {
        /* two separable positions with opposite targets */
        let observations = array![[1.0, 0.0], [0.0, 1.0]];
        let policies = array![[1.0, 0.0], [0.0, 1.0]];
        let values = array![0.8, -0.8];
        let data = TrainingSet::new(observations.clone(), policies, values).unwrap();

        let mut net = LinearNet::new(2, 2, 0.5);
        let first = net.train(&data, 1, 2).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = net.train(&data, 10, 2).unwrap();
        }
        assert!(last.policy < first.policy);
        assert!(last.value < first.value);

        let (policy, value) = net.infer(observations.view()).unwrap();
        assert!(policy[[0, 0]] > 0.8);
        assert!(policy[[1, 1]] > 0.8);
        assert!(value[0] > 0.5);
        assert!(value[1] < -0.5);
    }

    #[test]
    fn empty_training_set_fails() {
        let data = TrainingSet::new(Array2::zeros((0, 2)), Array2::zeros((0, 2)), Array1::zeros(0))
            .unwrap();
        let mut net = LinearNet::new(2, 2, 0.1);
        assert!(matches!(net.train(&data, 4, 2), Err(Error::Training { .. })));
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("iteration-0001.ckpt");

        let data = TrainingSet::new(
            array![[1.0, 0.0, 0.5]],
            array![[0.0, 1.0]],
            array![1.0],
        )
        .unwrap();
        let mut trained = LinearNet::new(3, 2, 0.3);
        trained.train(&data, 20, 1).unwrap();
        trained.save_checkpoint(&path).unwrap();

        let mut loaded = LinearNet::new(3, 2, 0.3);
        loaded.load_checkpoint(&path).unwrap();
        let input = array![[1.0, 0.0, 0.5], [0.0, 1.0, 0.0]];
        let (trained_pi, trained_v) = trained.infer(input.view()).unwrap();
        let (loaded_pi, loaded_v) = loaded.infer(input.view()).unwrap();
        assert!((&trained_pi - &loaded_pi).iter().all(|d| d.abs() < 1e-5));
        assert!((&trained_v - &loaded_v).iter().all(|d| d.abs() < 1e-5));
        assert!(trained_pi[[0, 1]] > 0.5);

        let mut wrong_shape = LinearNet::new(4, 2, 0.3);
        assert!(matches!(
            wrong_shape.load_checkpoint(&path),
            Err(Error::CorruptCheckpoint { .. })
        ));
        assert!(matches!(
            loaded.load_checkpoint(&dir.path().join("missing.ckpt")),
            Err(Error::MissingCheckpoint { .. })
        ));
    }
}
