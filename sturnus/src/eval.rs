//! Eval subcommand - score an existing checkpoint over a test corpus.

use eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use sturnus_asr::batch::BatchStream;
use sturnus_asr::corpus::CorpusTable;
use sturnus_asr::features::{FeatureMode, WavFeatureSource};
use sturnus_asr::linear::LinearProvider;
use sturnus_asr::model::Arch;
use sturnus_asr::optimizer::OptimizerKind;
use sturnus_asr::trainer::{RunConfig, Trainer};

/// CLI arguments for evaluation.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Test corpus CSV files, comma-separated
    #[arg(long, default_value = "./data/ldc93s1/ldc93s1.csv")]
    pub test_files: String,

    /// Checkpoint directory holding the model to score
    #[arg(long, required = true)]
    pub load_checkpoint: PathBuf,

    /// Model architecture identifier the checkpoint was trained under
    #[arg(long, default_value_t = 2)]
    pub arch: u32,

    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Validation steps, 0 to cover the test corpus once
    #[arg(long, default_value_t = 0)]
    pub valid_steps: usize,

    /// Run name used in log lines
    #[arg(long, default_value = "eval")]
    pub name: String,
}

/// Resolved evaluation configuration.
#[derive(Debug)]
pub struct Config {
    pub test_files: String,
    pub run: RunConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let arch = Arch::from_id(args.arch)?;

        Ok(Self {
            test_files: args.test_files,
            run: RunConfig {
                name: args.name,
                arch,
                batch_size: args.batch_size,
                epochs: 0,
                train_steps: 0,
                valid_steps: args.valid_steps,
                learning_rate: 0.01,
                optimizer: OptimizerKind::Sgd,
                load_checkpoint: Some(args.load_checkpoint),
                output_dir: PathBuf::from("checkpoints/results"),
                curve_log: false,
            },
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let table = Arc::new(
        CorpusTable::from_csv_files(&config.test_files).wrap_err("failed to load test corpus")?,
    );

    let mode = FeatureMode::for_arch(config.run.arch);
    tracing::info!(%mode, arch = %config.run.arch, "feature mode selected");

    let mut stream = BatchStream::new(
        table.clone(),
        WavFeatureSource,
        mode,
        config.run.batch_size,
        false,
        0,
    );

    let trainer = Trainer::new(config.run, LinearProvider);
    let report = trainer
        .evaluate(&mut stream, table.len())
        .wrap_err("evaluation failed")?;

    println!("Utterances : {}", report.utterances);
    println!("Mean WER   : {}", report.mean_wer);
    println!("Mean LER   : {}", report.mean_ler);
    println!("NormMeanLER: {}", report.norm_mean_ler);

    for (predicted, truth) in &report.samples {
        println!("pred: {predicted}");
        println!("true: {truth}");
    }

    Ok(())
}
