//! sturnus-asr: CTC acoustic model training and evaluation.
//!
//! This crate implements the data and metrics path shared by training and
//! evaluation of character-level CTC acoustic models: corpus tables, feature
//! extraction, padded mini-batch assembly with length tracking, best-path
//! decoding, WER/LER scoring, and the epoch loop with checkpoint retention.
//!
//! # Architecture
//!
//! The pipeline is built around a few seams:
//!
//! - [`features::FeatureSource`]: turns an utterance into per-frame features
//! - [`batch::BatchSource`]: a resettable stream of padded [`batch::Batch`]es
//! - [`model::AcousticModel`]: runs prediction and one optimization step
//! - [`model::ModelProvider`]: builds or restores a network for an architecture
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sturnus_asr::batch::BatchStream;
//! use sturnus_asr::corpus::CorpusTable;
//! use sturnus_asr::features::{FeatureMode, WavFeatureSource};
//! use sturnus_asr::linear::LinearProvider;
//! use sturnus_asr::trainer::{RunConfig, Trainer};
//!
//! let table = Arc::new(CorpusTable::from_csv_files("train.csv")?);
//! let mode = FeatureMode::for_arch(config.arch);
//! let mut train = BatchStream::new(table.clone(), WavFeatureSource, mode, 2, true, 0);
//! let mut valid = BatchStream::new(table, WavFeatureSource, mode, 2, false, 0);
//!
//! let summary = Trainer::new(config, LinearProvider)
//!     .run(&mut train, table_len, &mut valid, table_len)?;
//! println!("best mean LER: {}", summary.best_mean_ler);
//! ```

pub mod batch;
pub mod corpus;
pub mod ctc;
pub mod error;
pub mod features;
pub mod linear;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod report;
pub mod trainer;
pub mod vocab;
