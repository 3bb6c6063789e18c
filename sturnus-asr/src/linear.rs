//! Reference acoustic model: per-frame affine projection with softmax.
//!
//! The seven production topologies live behind [`ModelProvider`]; this
//! implementation keeps the full train/evaluate path exercisable without a
//! neural network runtime. One weight matrix maps each feature frame to
//! class logits, trained with exact CTC forward-backward gradients.

use crate::batch::Batch;
use crate::ctc;
use crate::error::{ModelError, Result};
use crate::model::{
    AcousticModel, Arch, FALLBACK_ENDPOINT, INPUT_ENDPOINT, ModelProvider, PRIMARY_ENDPOINT,
    Topology,
};
use crate::optimizer::Optimizer;
use crate::vocab::{BLANK_ID, OUTPUT_DIM};
use ndarray::{Array1, Array2, Array3, ArrayView3, Axis, s};

pub struct LinearModel {
    topology: Topology,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearModel {
    fn new(topology: Topology) -> Self {
        let (input_dim, output_dim) = (topology.input_dim, topology.output_dim);
        Self {
            topology,
            weights: Array2::zeros((input_dim, output_dim)),
            bias: Array1::zeros(output_dim),
        }
    }

    fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn logits(&self, frames: ndarray::ArrayView2<f32>) -> Array2<f32> {
        frames.dot(&self.weights) + &self.bias
    }
}

impl AcousticModel for LinearModel {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn predict(&self, features: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch, padded_len, _) = features.dim();
        let mut probs = Array3::zeros((batch, padded_len, self.topology.output_dim));

        for i in 0..batch {
            let logits = self.logits(features.index_axis(Axis(0), i));
            let log_probs = ctc::log_softmax(&logits);
            probs
                .index_axis_mut(Axis(0), i)
                .assign(&log_probs.mapv(f32::exp));
        }

        Ok(probs)
    }

    fn train_step(&mut self, batch: &Batch, optimizer: &mut Optimizer) -> Result<f32> {
        let mut grad_weights = Array2::<f32>::zeros(self.weights.dim());
        let mut grad_bias = Array1::<f32>::zeros(self.bias.dim());
        let mut loss_sum = 0.0;
        let mut counted = 0usize;

        for i in 0..batch.size() {
            let len = batch.input_lengths[i];
            let frames = batch.features.slice(s![i, ..len, ..]);

            let logits = self.logits(frames);
            let log_probs = ctc::log_softmax(&logits);
            let labels = batch.label_ids(i);

            let (loss, grad_logits) = ctc::ctc_loss_grad(log_probs.view(), &labels, BLANK_ID);

            if !loss.is_finite() {
                tracing::warn!(
                    frames = len,
                    labels = labels.len(),
                    "utterance not alignable, excluded from the step"
                );
                continue;
            }

            grad_weights += &frames.t().dot(&grad_logits);
            grad_bias += &grad_logits.sum_axis(Axis(0));
            loss_sum += loss;
            counted += 1;
        }

        if counted == 0 {
            return Ok(f32::INFINITY);
        }

        let scale = 1.0 / counted as f32;
        let mut params: Vec<f32> = self.weights.iter().chain(self.bias.iter()).copied().collect();
        let mut grads: Vec<f32> = grad_weights
            .iter()
            .chain(grad_bias.iter())
            .map(|g| g * scale)
            .collect();

        optimizer.update(&mut params, &mut grads);
        self.load_weights(&params)?;

        Ok(loss_sum * scale)
    }

    fn weights(&self) -> Vec<f32> {
        self.weights.iter().chain(self.bias.iter()).copied().collect()
    }

    fn load_weights(&mut self, weights: &[f32]) -> Result<()> {
        if weights.len() != self.param_count() {
            return Err(ModelError::WeightCountMismatch {
                expected: self.param_count(),
                got: weights.len(),
            }
            .into());
        }

        let split = self.weights.len();
        self.weights = Array2::from_shape_vec(self.weights.dim(), weights[..split].to_vec())
            .map_err(ModelError::Shape)?;
        self.bias = Array1::from_vec(weights[split..].to_vec());

        Ok(())
    }
}

/// Provider for [`LinearModel`] networks.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearProvider;

impl ModelProvider for LinearProvider {
    type Model = LinearModel;

    fn build(&self, arch: Arch, input_dim: usize) -> Result<Self::Model> {
        let topology = Topology {
            arch,
            input_dim,
            output_dim: OUTPUT_DIM,
            input_endpoint: INPUT_ENDPOINT.to_string(),
            output_endpoints: vec![PRIMARY_ENDPOINT.to_string(), FALLBACK_ENDPOINT.to_string()],
        };

        tracing::info!(%arch, input_dim, output_dim = OUTPUT_DIM, "new model");
        Ok(LinearModel::new(topology))
    }

    fn restore(&self, topology: Topology, weights: Vec<f32>) -> Result<Self::Model> {
        let mut model = LinearModel::new(topology);
        model.load_weights(&weights)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptimizerKind;
    use ndarray::Array3;

    fn peaked_batch(sequence: &[u32], labels: &[u32], dim: usize) -> Batch {
        // Features one-hot on the target class so the affine map can
        // separate classes linearly.
        let mut features = Array3::zeros((1, sequence.len(), dim));
        for (t, &c) in sequence.iter().enumerate() {
            features[[0, t, c as usize % dim]] = 1.0;
        }

        let mut label_array = Array2::from_elem((1, labels.len()), crate::vocab::PAD_ID);
        for (j, &l) in labels.iter().enumerate() {
            label_array[[0, j]] = l;
        }

        Batch {
            features,
            input_lengths: vec![sequence.len()],
            labels: label_array,
            label_lengths: vec![labels.len()],
            transcripts: vec![crate::vocab::decode_labels(labels)],
        }
    }

    #[test]
    fn training_reduces_loss() {
        let mut model = LinearProvider.build(Arch::Ds1, 26).unwrap();
        let mut optimizer = Optimizer::new(OptimizerKind::Adam, 0.1);

        let batch = peaked_batch(&[3, 3, 1, 1, 20, 20], &[3, 1, 20], 26);

        let first = model.train_step(&batch, &mut optimizer).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = model.train_step(&batch, &mut optimizer).unwrap();
        }

        assert!(last < first, "loss did not improve: {first} -> {last}");
    }

    #[test]
    fn predict_shape_matches_batch() {
        let model = LinearProvider.build(Arch::Ds1, 26).unwrap();
        let features = Array3::zeros((2, 10, 26));

        let probs = model.predict(features.view()).unwrap();

        assert_eq!(probs.shape(), &[2, 10, OUTPUT_DIM]);
        // Rows are probability distributions
        for i in 0..2 {
            for t in 0..10 {
                let sum: f32 = probs.slice(s![i, t, ..]).sum();
                assert!((sum - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn weights_round_trip_preserves_predictions() {
        let mut model = LinearProvider.build(Arch::Ds1, 4).unwrap();
        let mut optimizer = Optimizer::new(OptimizerKind::Sgd, 0.1);
        let batch = peaked_batch(&[1, 2, 3], &[1, 2, 3], 4);
        model.train_step(&batch, &mut optimizer).unwrap();

        let saved = model.weights();
        let restored = LinearProvider
            .restore(model.topology().clone(), saved)
            .unwrap();

        let features = Array3::from_shape_fn((1, 5, 4), |(_, t, d)| (t + d) as f32 * 0.1);
        assert_eq!(
            model.predict(features.view()).unwrap(),
            restored.predict(features.view()).unwrap()
        );
    }

    #[test]
    fn rejects_wrong_weight_count() {
        let mut model = LinearProvider.build(Arch::Ds1, 4).unwrap();
        assert!(model.load_weights(&[0.0; 3]).is_err());
    }
}
