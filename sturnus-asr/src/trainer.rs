//! Training and evaluation orchestration.
//!
//! The run proceeds through load-or-build, compile, and either the epoch
//! loop or a single forced evaluation. One training step or one validation
//! step executes to completion before the next; checkpoint writes are gated
//! on the reporter's improvement signal.

use crate::batch::BatchSource;
use crate::error::{ConfigError, Result};
use crate::features::FeatureMode;
use crate::model::{self, AcousticModel, Arch, ModelProvider, resolve_prediction_endpoint};
use crate::optimizer::{Optimizer, OptimizerKind};
use crate::report::{EpochReport, Reporter};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Immutable run configuration consumed by the orchestrator.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Run name, used in log lines and the curve log file name
    pub name: String,
    pub arch: Arch,
    pub batch_size: usize,
    pub epochs: usize,
    /// Training steps per epoch; 0 derives `corpus_size / batch_size`
    pub train_steps: usize,
    /// Validation steps per epoch; 0 derives `corpus_size / batch_size`
    pub valid_steps: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Load an existing checkpoint instead of building a new network
    pub load_checkpoint: Option<PathBuf>,
    /// Directory receiving the topology and weight artifacts
    pub output_dir: PathBuf,
    /// Write per-epoch training-curve records as JSON lines
    pub curve_log: bool,
}

/// Lifetime metric histories returned at teardown.
#[derive(Debug)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub mean_wer_log: Vec<f32>,
    pub mean_ler_log: Vec<f32>,
    pub norm_mean_ler_log: Vec<f32>,
    pub best_mean_ler: f32,
}

#[derive(Serialize)]
struct CurveRecord {
    epoch: usize,
    train_loss: f32,
    mean_wer: f32,
    mean_ler: f32,
    norm_mean_ler: f32,
}

/// Derive a step count from the corpus when none was requested.
pub fn derive_steps(requested: usize, corpus_size: usize, batch_size: usize) -> usize {
    if requested != 0 {
        requested
    } else {
        (corpus_size / batch_size).max(1)
    }
}

pub struct Trainer<P> {
    config: RunConfig,
    provider: P,
}

impl<P: ModelProvider> Trainer<P> {
    pub fn new(config: RunConfig, provider: P) -> Self {
        Self { config, provider }
    }

    /// Load an existing network or build a fresh one.
    fn load_or_build(&self) -> Result<P::Model> {
        let mode = FeatureMode::for_arch(self.config.arch);

        match &self.config.load_checkpoint {
            Some(dir) => {
                let (topology, weights) = model::load_checkpoint(dir)?;
                resolve_prediction_endpoint(&topology.output_endpoints)?;

                if topology.input_dim != mode.dim() {
                    return Err(ConfigError::FeatureModeMismatch {
                        checkpoint_dim: topology.input_dim,
                        mode_dim: mode.dim(),
                    }
                    .into());
                }

                self.provider.restore(topology, weights)
            }
            None => self.provider.build(self.config.arch, mode.dim()),
        }
    }

    /// Run the full training loop.
    ///
    /// `train_size` and `valid_size` are the corpus row counts behind each
    /// stream, used to derive step counts when the configuration leaves
    /// them at 0.
    pub fn run<T, V>(
        &self,
        train: &mut T,
        train_size: usize,
        valid: &mut V,
        valid_size: usize,
    ) -> Result<TrainingSummary>
    where
        T: BatchSource,
        V: BatchSource,
    {
        let mut network = self.load_or_build()?;

        // Whether built or resumed, weights saved on improvement must land
        // beside a topology so the output directory is loadable on its own.
        model::save_topology(&self.config.output_dir, network.topology())?;

        let mut optimizer = Optimizer::new(self.config.optimizer, self.config.learning_rate);

        let train_steps = derive_steps(self.config.train_steps, train_size, self.config.batch_size);
        let valid_steps = derive_steps(self.config.valid_steps, valid_size, self.config.batch_size);

        tracing::info!(
            name = %self.config.name,
            arch = %self.config.arch,
            optimizer = %self.config.optimizer,
            train_steps,
            valid_steps,
            epochs = self.config.epochs,
            "training"
        );

        let mut reporter = Reporter::new();
        let mut curve = self.open_curve_log()?;

        for epoch in 0..self.config.epochs {
            let mut loss_sum = 0.0;
            let mut steps_done = 0usize;

            for _ in 0..train_steps {
                let Some(batch) = train.next_batch()? else {
                    break;
                };
                loss_sum += network.train_step(&batch, &mut optimizer)?;
                steps_done += 1;
            }

            let train_loss = if steps_done == 0 {
                0.0
            } else {
                loss_sum / steps_done as f32
            };
            tracing::info!(epoch, train_loss, steps = steps_done, "epoch trained");

            // The bounded validation stream must cover the table again
            valid.reset();
            let report = reporter.on_epoch_end(epoch, &network, valid, valid_steps)?;

            if report.improved {
                model::save_weights(&self.config.output_dir, &network.weights())?;
            }

            if let Some(file) = curve.as_mut() {
                let record = CurveRecord {
                    epoch,
                    train_loss,
                    mean_wer: report.mean_wer,
                    mean_ler: report.mean_ler,
                    norm_mean_ler: report.norm_mean_ler,
                };
                serde_json::to_writer(&mut *file, &record)?;
                writeln!(file)?;
            }
        }

        tracing::info!(
            mean_wer_log = ?reporter.mean_wer_log,
            mean_ler_log = ?reporter.mean_ler_log,
            norm_mean_ler_log = ?reporter.norm_mean_ler_log,
            "training finished"
        );

        Ok(TrainingSummary {
            epochs: self.config.epochs,
            best_mean_ler: reporter.best_mean_ler(),
            mean_wer_log: reporter.mean_wer_log,
            mean_ler_log: reporter.mean_ler_log,
            norm_mean_ler_log: reporter.norm_mean_ler_log,
        })
    }

    /// Evaluate an existing checkpoint: a single forced report, no
    /// checkpoint writes.
    pub fn evaluate<V: BatchSource>(
        &self,
        valid: &mut V,
        valid_size: usize,
    ) -> Result<EpochReport> {
        if self.config.load_checkpoint.is_none() {
            return Err(ConfigError::CheckpointRequired.into());
        }

        let network = self.load_or_build()?;
        let valid_steps = derive_steps(self.config.valid_steps, valid_size, self.config.batch_size);

        let mut reporter = Reporter::new();
        reporter.force_output = true;

        reporter.on_epoch_end(0, &network, valid, valid_steps)
    }

    fn open_curve_log(&self) -> Result<Option<std::fs::File>> {
        if !self.config.curve_log {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self
            .config
            .output_dir
            .join(format!("{}.curve.jsonl", self.config.name));
        let file = std::fs::File::create(&path)?;

        tracing::info!(path = %path.display(), "curve log enabled");
        Ok(Some(file))
    }
}
