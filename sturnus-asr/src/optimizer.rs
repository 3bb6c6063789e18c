//! Optimizer variants attached at compile time.
//!
//! Hyperparameters match the original training recipes: SGD uses Nesterov
//! momentum 0.9 with decay 1e-6; Adam and Nadam use beta1 0.9, beta2 0.999,
//! epsilon 1e-8. All three clip the global gradient norm to 5.

use crate::error::{ConfigError, Error, Result};
use std::str::FromStr;

const CLIP_NORM: f32 = 5.0;
const SGD_MOMENTUM: f32 = 0.9;
const SGD_DECAY: f32 = 1e-6;
const BETA_1: f32 = 0.9;
const BETA_2: f32 = 0.999;
const EPSILON: f32 = 1e-8;

/// Supported optimizer variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerKind {
    /// Stochastic gradient descent with Nesterov momentum
    Sgd,
    Adam,
    Nadam,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    /// Case-insensitive parse; an unknown name is a fatal configuration
    /// error naming the string.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            "nadam" => Ok(OptimizerKind::Nadam),
            _ => Err(ConfigError::UnknownOptimizer {
                name: s.to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::Nadam => write!(f, "nadam"),
        }
    }
}

/// Optimizer state over a flat parameter vector.
pub struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f32,
    step: u64,
    moment_1: Vec<f32>,
    moment_2: Vec<f32>,
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f32) -> Self {
        Self {
            kind,
            learning_rate,
            step: 0,
            moment_1: Vec::new(),
            moment_2: Vec::new(),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }

    /// Apply one update to flattened parameters in place.
    ///
    /// `params` and `grads` must have the same length across every call.
    pub fn update(&mut self, params: &mut [f32], grads: &mut [f32]) {
        debug_assert_eq!(params.len(), grads.len());

        if self.moment_1.len() != params.len() {
            self.moment_1 = vec![0.0; params.len()];
            self.moment_2 = vec![0.0; params.len()];
        }

        self.step += 1;
        clip_by_global_norm(grads, CLIP_NORM);

        match self.kind {
            OptimizerKind::Sgd => self.sgd_step(params, grads),
            OptimizerKind::Adam => self.adam_step(params, grads, false),
            OptimizerKind::Nadam => self.adam_step(params, grads, true),
        }
    }

    fn sgd_step(&mut self, params: &mut [f32], grads: &[f32]) {
        let lr = self.learning_rate / (1.0 + SGD_DECAY * self.step as f32);

        for i in 0..params.len() {
            let velocity = SGD_MOMENTUM * self.moment_1[i] - lr * grads[i];
            self.moment_1[i] = velocity;
            // Nesterov lookahead
            params[i] += SGD_MOMENTUM * velocity - lr * grads[i];
        }
    }

    fn adam_step(&mut self, params: &mut [f32], grads: &[f32], nesterov: bool) {
        let t = self.step as f32;
        let bias_1 = 1.0 - BETA_1.powf(t);
        let bias_2 = 1.0 - BETA_2.powf(t);

        for i in 0..params.len() {
            let g = grads[i];
            self.moment_1[i] = BETA_1 * self.moment_1[i] + (1.0 - BETA_1) * g;
            self.moment_2[i] = BETA_2 * self.moment_2[i] + (1.0 - BETA_2) * g * g;

            let m_hat = self.moment_1[i] / bias_1;
            let v_hat = self.moment_2[i] / bias_2;

            let direction = if nesterov {
                BETA_1 * m_hat + (1.0 - BETA_1) * g / bias_1
            } else {
                m_hat
            };

            params[i] -= self.learning_rate * direction / (v_hat.sqrt() + EPSILON);
        }
    }
}

/// Scale gradients so their global L2 norm does not exceed `max_norm`.
fn clip_by_global_norm(grads: &mut [f32], max_norm: f32) {
    let norm = grads.iter().map(|g| g * g).sum::<f32>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        for g in grads.iter_mut() {
            *g *= scale;
        }
    }
}
