//! Model provider contracts, endpoint resolution, and checkpoint layout.
//!
//! Network topologies themselves live behind [`ModelProvider`]; this module
//! fixes what the trainer and reporter require from any implementation: a
//! named input endpoint, a resolvable prediction endpoint, one optimization
//! step, and weight access for checkpointing.

use crate::batch::Batch;
use crate::error::{ConfigError, ModelError, Result};
use crate::optimizer::Optimizer;
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input endpoint name recorded in every topology.
pub const INPUT_ENDPOINT: &str = "the_input";

/// Prediction endpoint name on a full network (pre-loss logits).
pub const PRIMARY_ENDPOINT: &str = "ctc";

/// Alternate output endpoint on a trimmed network with the loss layer removed.
pub const FALLBACK_ENDPOINT: &str = "out";

/// Acoustic network architecture variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arch {
    /// DeepSpeech1 with dropout
    Ds1Dropout,
    /// DeepSpeech1
    Ds1,
    /// DeepSpeech2 with GRU
    Ds2Gru,
    /// Custom recurrent model
    Custom,
    /// Graves 2006 model
    Graves,
    /// Pure CNN + fully connected model
    CnnCity,
    /// Constrained fully connected model
    Constrained,
}

impl Arch {
    /// Resolve a numeric architecture identifier.
    ///
    /// # Errors
    ///
    /// Fatal [`ConfigError::UnknownArchitecture`] naming the id when outside
    /// 0..=6.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Arch::Ds1Dropout),
            1 => Ok(Arch::Ds1),
            2 => Ok(Arch::Ds2Gru),
            3 => Ok(Arch::Custom),
            4 => Ok(Arch::Graves),
            5 => Ok(Arch::CnnCity),
            6 => Ok(Arch::Constrained),
            _ => Err(ConfigError::UnknownArchitecture { id }.into()),
        }
    }

    /// Numeric identifier of this architecture.
    pub fn id(self) -> u32 {
        match self {
            Arch::Ds1Dropout => 0,
            Arch::Ds1 => 1,
            Arch::Ds2Gru => 2,
            Arch::Custom => 3,
            Arch::Graves => 4,
            Arch::CnnCity => 5,
            Arch::Constrained => 6,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DS{}", self.id())
    }
}

/// Resolve the prediction endpoint from a topology's output endpoint names.
///
/// Explicit two-step resolution: the primary `"ctc"` endpoint first, then
/// the `"out"` endpoint of a trimmed network.
///
/// # Errors
///
/// Fatal [`ConfigError::MissingEndpoint`] naming both candidates when
/// neither exists.
pub fn resolve_prediction_endpoint(available: &[String]) -> Result<&'static str> {
    if available.iter().any(|name| name == PRIMARY_ENDPOINT) {
        return Ok(PRIMARY_ENDPOINT);
    }

    if available.iter().any(|name| name == FALLBACK_ENDPOINT) {
        tracing::warn!(
            "couldn't find {PRIMARY_ENDPOINT:?} endpoint, possibly a trimmed network, \
             using {FALLBACK_ENDPOINT:?}"
        );
        return Ok(FALLBACK_ENDPOINT);
    }

    Err(ConfigError::MissingEndpoint {
        primary: PRIMARY_ENDPOINT.to_string(),
        fallback: FALLBACK_ENDPOINT.to_string(),
    }
    .into())
}

/// Serializable network topology persisted at checkpoint build time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topology {
    pub arch: Arch,
    pub input_dim: usize,
    pub output_dim: usize,
    pub input_endpoint: String,
    pub output_endpoints: Vec<String>,
}

/// Acoustic model exposing the endpoints the trainer and reporter need.
pub trait AcousticModel {
    /// Topology metadata, including endpoint names.
    fn topology(&self) -> &Topology;

    /// Per-timestep class probabilities for a padded feature batch.
    ///
    /// Output shape is (batch, padded_len, output_dim); only the first
    /// `input_lengths[i]` timesteps of utterance i are meaningful.
    fn predict(&self, features: ArrayView3<f32>) -> Result<Array3<f32>>;

    /// Consume one training batch and apply one optimization step.
    ///
    /// Returns the mean CTC loss over the batch.
    fn train_step(&mut self, batch: &Batch, optimizer: &mut Optimizer) -> Result<f32>;

    /// Flattened trainable weights for checkpointing.
    fn weights(&self) -> Vec<f32>;

    /// Restore flattened weights.
    fn load_weights(&mut self, weights: &[f32]) -> Result<()>;
}

/// Builds new networks and restores checkpointed ones.
pub trait ModelProvider {
    type Model: AcousticModel;

    /// Construct a fresh network for the architecture and input dimension.
    fn build(&self, arch: Arch, input_dim: usize) -> Result<Self::Model>;

    /// Reconstruct a network from checkpointed topology and weights.
    fn restore(&self, topology: Topology, weights: Vec<f32>) -> Result<Self::Model>;
}

/// Checkpoint directory layout: `{dir}/model` holds the topology, with a
/// co-located weights artifact of the same base name.
const TOPOLOGY_FILE: &str = "model";
const WEIGHTS_FILE: &str = "model.weights";

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let ckpt_io = |source| ModelError::CheckpointIo {
        path: path.to_path_buf(),
        source,
    };

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(ckpt_io)?;
    std::fs::rename(&tmp, path).map_err(ckpt_io)?;

    Ok(())
}

/// Persist a topology at `{dir}/model`, creating the directory.
pub fn save_topology(dir: &Path, topology: &Topology) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| ModelError::CheckpointIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let bytes = serde_json::to_vec_pretty(topology)?;
    write_atomic(&dir.join(TOPOLOGY_FILE), &bytes)?;

    tracing::info!(path = %dir.display(), "topology saved");
    Ok(())
}

/// Persist weights at `{dir}/model.weights`, creating the directory.
pub fn save_weights(dir: &Path, weights: &[f32]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| ModelError::CheckpointIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let bytes = serde_json::to_vec(weights)?;
    write_atomic(&dir.join(WEIGHTS_FILE), &bytes)?;

    tracing::info!(path = %dir.display(), "weights saved");
    Ok(())
}

/// Load a checkpoint's topology and weights from a directory.
///
/// # Errors
///
/// Fatal [`ConfigError::CheckpointNotFound`] naming the path when the
/// directory does not exist.
pub fn load_checkpoint(dir: &Path) -> Result<(Topology, Vec<f32>)> {
    if !dir.is_dir() {
        return Err(ConfigError::CheckpointNotFound {
            path: dir.to_path_buf(),
        }
        .into());
    }

    let ckpt_io = |path: PathBuf| {
        move |source| ModelError::CheckpointIo { path, source }
    };

    let topology_path = dir.join(TOPOLOGY_FILE);
    let topology_bytes =
        std::fs::read(&topology_path).map_err(ckpt_io(topology_path))?;
    let topology: Topology = serde_json::from_slice(&topology_bytes)?;

    let weights_path = dir.join(WEIGHTS_FILE);
    let weights_bytes = std::fs::read(&weights_path).map_err(ckpt_io(weights_path))?;
    let weights: Vec<f32> = serde_json::from_slice(&weights_bytes)?;

    tracing::info!(path = %dir.display(), "checkpoint loaded");
    Ok((topology, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn arch_ids_round_trip() {
        for id in 0..=6 {
            assert_eq!(Arch::from_id(id).unwrap().id(), id);
        }
    }

    #[test]
    fn unknown_arch_is_fatal_and_names_the_id() {
        match Arch::from_id(7) {
            Err(Error::Config(ConfigError::UnknownArchitecture { id })) => assert_eq!(id, 7),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn resolves_primary_endpoint() {
        let available = vec!["ctc".to_string()];
        assert_eq!(resolve_prediction_endpoint(&available).unwrap(), "ctc");
    }

    #[test]
    fn falls_back_to_trimmed_output() {
        let available = vec!["out".to_string()];
        assert_eq!(resolve_prediction_endpoint(&available).unwrap(), "out");
    }

    #[test]
    fn missing_both_endpoints_is_fatal() {
        let available = vec!["softmax".to_string()];
        match resolve_prediction_endpoint(&available) {
            Err(Error::Config(ConfigError::MissingEndpoint { primary, fallback })) => {
                assert_eq!(primary, "ctc");
                assert_eq!(fallback, "out");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = std::env::temp_dir().join("sturnus_ckpt_round_trip");
        std::fs::remove_dir_all(&dir).ok();

        let topology = Topology {
            arch: Arch::Ds1,
            input_dim: 26,
            output_dim: 29,
            input_endpoint: INPUT_ENDPOINT.to_string(),
            output_endpoints: vec![PRIMARY_ENDPOINT.to_string()],
        };
        let weights = vec![0.5, -1.25, 3.0];

        save_topology(&dir, &topology).unwrap();
        save_weights(&dir, &weights).unwrap();

        let (loaded_topology, loaded_weights) = load_checkpoint(&dir).unwrap();

        assert_eq!(loaded_topology.arch, Arch::Ds1);
        assert_eq!(loaded_topology.input_dim, 26);
        assert_eq!(loaded_weights, weights);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_checkpoint_dir_is_fatal_and_names_the_path() {
        let dir = PathBuf::from("/nonexistent/checkpoints/run");
        match load_checkpoint(&dir) {
            Err(Error::Config(ConfigError::CheckpointNotFound { path })) => {
                assert_eq!(path, dir);
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
