//! Train subcommand - fit an acoustic model over labeled corpora.

use eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use sturnus_asr::batch::{BatchStream, PrefetchStream};
use sturnus_asr::corpus::CorpusTable;
use sturnus_asr::features::{FeatureMode, WavFeatureSource};
use sturnus_asr::linear::LinearProvider;
use sturnus_asr::model::Arch;
use sturnus_asr::optimizer::OptimizerKind;
use sturnus_asr::trainer::{RunConfig, Trainer};

/// CLI arguments for training.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Training corpus CSV files, comma-separated
    #[arg(long, default_value = "./data/ldc93s1/ldc93s1.csv")]
    pub train_files: String,

    /// Validation corpus CSV files, comma-separated
    #[arg(long, default_value = "./data/ldc93s1/ldc93s1.csv")]
    pub valid_files: String,

    /// Model architecture identifier (0..=6)
    #[arg(long, default_value_t = 0)]
    pub arch: u32,

    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 40)]
    pub epochs: usize,

    /// Training steps per epoch, 0 for automatic
    #[arg(long, default_value_t = 0)]
    pub train_steps: usize,

    /// Validation steps per epoch, 0 for automatic
    #[arg(long, default_value_t = 0)]
    pub valid_steps: usize,

    #[arg(long, default_value_t = 0.01)]
    pub learning_rate: f32,

    /// Optimizer: sgd, adam, or nadam
    #[arg(long, default_value = "sgd")]
    pub opt: String,

    /// Load an existing checkpoint directory instead of building a new model
    #[arg(long)]
    pub load_checkpoint: Option<PathBuf>,

    /// Directory receiving topology and weight artifacts
    #[arg(long, default_value = "checkpoints/results")]
    pub output_dir: PathBuf,

    /// Run name; defaults to DS{arch}_{timestamp}
    #[arg(long)]
    pub name: Option<String>,

    /// Write per-epoch training-curve records as JSON lines
    #[arg(long)]
    pub curve_log: bool,

    /// Batches assembled ahead by the prefetch worker
    #[arg(long, default_value_t = 2)]
    pub prefetch: usize,
}

/// Resolved training configuration.
#[derive(Debug)]
pub struct Config {
    pub train_files: String,
    pub valid_files: String,
    pub prefetch: usize,
    pub run: RunConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let arch = Arch::from_id(args.arch)?;
        let optimizer: OptimizerKind = args.opt.parse()?;

        let name = args.name.unwrap_or_else(|| {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("{arch}_{timestamp}")
        });

        Ok(Self {
            train_files: args.train_files,
            valid_files: args.valid_files,
            prefetch: args.prefetch,
            run: RunConfig {
                name,
                arch,
                batch_size: args.batch_size,
                epochs: args.epochs,
                train_steps: args.train_steps,
                valid_steps: args.valid_steps,
                learning_rate: args.learning_rate,
                optimizer,
                load_checkpoint: args.load_checkpoint,
                output_dir: args.output_dir,
                curve_log: args.curve_log,
            },
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let train_table = Arc::new(
        CorpusTable::from_csv_files(&config.train_files)
            .wrap_err("failed to load training corpus")?,
    );
    let valid_table = Arc::new(
        CorpusTable::from_csv_files(&config.valid_files)
            .wrap_err("failed to load validation corpus")?,
    );

    let mode = FeatureMode::for_arch(config.run.arch);
    tracing::info!(%mode, arch = %config.run.arch, "feature mode selected");

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let train_stream = BatchStream::new(
        train_table.clone(),
        WavFeatureSource,
        mode,
        config.run.batch_size,
        true,
        seed,
    );
    let mut train = PrefetchStream::spawn(train_stream, config.prefetch);

    let mut valid = BatchStream::new(
        valid_table.clone(),
        WavFeatureSource,
        mode,
        config.run.batch_size,
        false,
        seed,
    );

    let trainer = Trainer::new(config.run, LinearProvider);
    let summary = trainer
        .run(&mut train, train_table.len(), &mut valid, valid_table.len())
        .wrap_err("training failed")?;

    println!("Mean WER   : {:?}", summary.mean_wer_log);
    println!("Mean LER   : {:?}", summary.mean_ler_log);
    println!("NormMeanLER: {:?}", summary.norm_mean_ler_log);
    println!("Best LER   : {}", summary.best_mean_ler);

    Ok(())
}
