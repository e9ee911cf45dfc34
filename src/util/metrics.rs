pub(crate) struct RunningAverage {
    value: f64,
    samples: u64,
    epsilon: f64,
    inner: metrics::Gauge,
}
impl RunningAverage {
    pub fn new(epsilon: f64, inner: metrics::Gauge) -> Self {
        assert!((0.0..1.0).contains(&epsilon));
        Self {
            value: 0.0,
            samples: 0,
            epsilon,
            inner,
        }
    }

    /// Fold `count` observations of `new_value` into the average.
    ///
    /// The first observation seeds the average so early readings are not biased towards zero.
    pub fn update(&mut self, new_value: f64, count: u64) {
        for _ in 0..count {
            if self.samples == 0 {
                self.value = new_value;
            } else {
                self.value = (1.0 - self.epsilon) * self.value + self.epsilon * new_value;
            }
            self.samples += 1;
        }
        self.inner.set(self.value);
    }

    pub fn get(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_by_first_value() {
        let mut avg = RunningAverage::new(0.5, metrics::gauge!("test.avg"));
        avg.update(4.0, 1);
        assert_eq!(avg.get(), 4.0);
        avg.update(2.0, 1);
        assert_eq!(avg.get(), 3.0);
        avg.update(3.0, 2);
        assert_eq!(avg.get(), 3.0);
    }
}
