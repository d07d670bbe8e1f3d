//! Logistic regression pair classifier
//!
//! Batch gradient descent from zero weights with L2 regularisation; the
//! bias (feature 0) is not regularised. Training is deterministic for a
//! given training set.

const LEARNING_RATE: f64 = 0.5;
const EPOCHS: usize = 500;
const L2: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub weights: Vec<f64>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Model {
    /// Untrained model (probability 0.5 for every pair)
    pub fn zero(features: usize) -> Self {
        Self {
            weights: vec![0.0; features],
        }
    }

    /// Fit on `(features, is_match)` examples
    pub fn fit(examples: &[(Vec<f64>, bool)], features: usize) -> Self {
        let mut model = Self::zero(features);
        if examples.is_empty() {
            return model;
        }
        let n = examples.len() as f64;
        for _ in 0..EPOCHS {
            let mut gradient = vec![0.0; features];
            for (x, label) in examples {
                let error = model.predict(x) - if *label { 1.0 } else { 0.0 };
                for (g, xi) in gradient.iter_mut().zip(x) {
                    *g += error * xi;
                }
            }
            for (i, (w, g)) in model.weights.iter_mut().zip(&gradient).enumerate() {
                let penalty = if i == 0 { 0.0 } else { L2 * *w };
                *w -= LEARNING_RATE * (g / n + penalty);
            }
        }
        model
    }

    /// Match probability
    pub fn predict(&self, x: &[f64]) -> f64 {
        sigmoid(self.weights.iter().zip(x).map(|(w, xi)| w * xi).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrained_model_is_undecided() {
        assert_eq!(Model::zero(3).predict(&[1.0, 0.3, 0.9]), 0.5);
    }

    #[test]
    fn separates_similar_from_dissimilar_pairs() {
        let examples = vec![
            (vec![1.0, 0.95, 1.0], true),
            (vec![1.0, 1.0, 0.9], true),
            (vec![1.0, 0.2, 0.1], false),
            (vec![1.0, 0.3, 0.0], false),
            (vec![1.0, 0.1, 0.4], false),
        ];
        let model = Model::fit(&examples, 3);
        assert!(model.predict(&[1.0, 0.97, 0.95]) > 0.7);
        assert!(model.predict(&[1.0, 0.15, 0.2]) < 0.3);
        assert_eq!(model, Model::fit(&examples, 3));
    }
}
