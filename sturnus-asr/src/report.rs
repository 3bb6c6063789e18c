//! Decode-and-score reporter invoked at epoch boundaries.
//!
//! The reporter owns the process-lifetime metric state: the best mean LER
//! seen so far and the lifetime history of epoch means. It is the only
//! mutator of that state, called synchronously by the trainer.

use crate::batch::BatchSource;
use crate::ctc;
use crate::error::Result;
use crate::metrics::{self, MetricRecord};
use crate::model::{AcousticModel, resolve_prediction_endpoint};
use crate::vocab::{BLANK_ID, decode_labels};
use ndarray::Axis;

/// Sample transcript pairs logged per report.
const SAMPLE_LIMIT: usize = 5;

/// One epoch's aggregate metrics and improvement signal.
#[derive(Clone, Debug)]
pub struct EpochReport {
    pub epoch: usize,
    /// Utterances actually scored this epoch
    pub utterances: usize,
    pub mean_wer: f32,
    pub mean_ler: f32,
    pub norm_mean_ler: f32,
    /// Mean LER strictly improved on the best marker
    pub improved: bool,
    /// (predicted, true) transcript pairs
    pub samples: Vec<(String, String)>,
}

/// Decode & metrics reporter with checkpoint gating state.
pub struct Reporter {
    best_mean_ler: f32,
    pub mean_wer_log: Vec<f32>,
    pub mean_ler_log: Vec<f32>,
    pub norm_mean_ler_log: Vec<f32>,
    /// Emit the report even without improvement (evaluation-only runs)
    pub force_output: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            best_mean_ler: f32::INFINITY,
            mean_wer_log: Vec::new(),
            mean_ler_log: Vec::new(),
            norm_mean_ler_log: Vec::new(),
            force_output: false,
        }
    }

    /// Lowest mean LER seen across epochs so far.
    pub fn best_mean_ler(&self) -> f32 {
        self.best_mean_ler
    }

    /// Decode and score up to `valid_steps` validation batches.
    ///
    /// Aggregates per-utterance LER/WER/normalized-LER into epoch means,
    /// appends them to the lifetime history logs, and moves the best-metric
    /// marker on strict improvement. The returned `improved` flag gates
    /// checkpoint persistence in the caller; `force_output` only forces the
    /// report itself.
    pub fn on_epoch_end<M, B>(
        &mut self,
        epoch: usize,
        model: &M,
        stream: &mut B,
        valid_steps: usize,
    ) -> Result<EpochReport>
    where
        M: AcousticModel,
        B: BatchSource,
    {
        let endpoint = resolve_prediction_endpoint(&model.topology().output_endpoints)?;

        let mut records: Vec<MetricRecord> = Vec::new();
        let mut samples: Vec<(String, String)> = Vec::new();

        for _ in 0..valid_steps {
            let Some(batch) = stream.next_batch()? else {
                break;
            };

            let probs = model.predict(batch.features.view())?;

            for i in 0..batch.size() {
                let decoded = ctc::best_path_decode(
                    probs.index_axis(Axis(0), i),
                    batch.input_lengths[i],
                    BLANK_ID,
                )?;

                let true_ids = batch.label_ids(i);
                let pred_text = decode_labels(&decoded);
                let true_text = decode_labels(&true_ids);

                records.push(metrics::score(&decoded, &true_ids, &pred_text, &true_text));

                if samples.len() < SAMPLE_LIMIT {
                    samples.push((pred_text, batch.transcripts[i].clone()));
                }
            }
        }

        let lers: Vec<f32> = records.iter().map(|r| r.ler).collect();
        let wers: Vec<f32> = records.iter().map(|r| r.wer).collect();
        let norm_lers: Vec<f32> = records.iter().map(|r| r.norm_ler).collect();

        let mean_ler = metrics::mean(&lers);
        let mean_wer = metrics::mean(&wers);
        let norm_mean_ler = metrics::mean(&norm_lers);

        self.mean_wer_log.push(mean_wer);
        self.mean_ler_log.push(mean_ler);
        self.norm_mean_ler_log.push(norm_mean_ler);

        let improved = !records.is_empty() && mean_ler < self.best_mean_ler;
        if improved {
            self.best_mean_ler = mean_ler;
        }

        tracing::info!(
            epoch,
            endpoint,
            utterances = records.len(),
            mean_wer,
            mean_ler,
            norm_mean_ler,
            best_mean_ler = self.best_mean_ler,
            "epoch report"
        );

        if improved || self.force_output {
            for (predicted, truth) in &samples {
                tracing::info!(predicted, truth, "sample transcript");
            }
        }

        Ok(EpochReport {
            epoch,
            utterances: records.len(),
            mean_wer,
            mean_ler,
            norm_mean_ler,
            improved,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::error::Result;
    use crate::model::{Arch, INPUT_ENDPOINT, Topology};
    use crate::optimizer::Optimizer;
    use crate::vocab::{OUTPUT_DIM, PAD_ID, encode_transcript};
    use ndarray::{Array2, Array3, ArrayView3};

    /// Model emitting a fixed per-utterance class sequence, one class per
    /// feature frame, read from the feature argmax.
    struct EchoModel {
        topology: Topology,
    }

    impl EchoModel {
        fn new(output_endpoints: Vec<String>) -> Self {
            Self {
                topology: Topology {
                    arch: Arch::Ds1,
                    input_dim: OUTPUT_DIM,
                    output_dim: OUTPUT_DIM,
                    input_endpoint: INPUT_ENDPOINT.to_string(),
                    output_endpoints,
                },
            }
        }
    }

    impl AcousticModel for EchoModel {
        fn topology(&self) -> &Topology {
            &self.topology
        }

        fn predict(&self, features: ArrayView3<f32>) -> Result<Array3<f32>> {
            // Features already are class scores here.
            Ok(features.to_owned())
        }

        fn train_step(&mut self, _: &Batch, _: &mut Optimizer) -> Result<f32> {
            unreachable!("reporter never trains")
        }

        fn weights(&self) -> Vec<f32> {
            Vec::new()
        }

        fn load_weights(&mut self, _: &[f32]) -> Result<()> {
            Ok(())
        }
    }

    /// Bounded stream over pre-assembled batches.
    struct FixedBatches {
        batches: Vec<Batch>,
        cursor: usize,
    }

    impl FixedBatches {
        fn new(batches: Vec<Batch>) -> Self {
            Self { batches, cursor: 0 }
        }
    }

    impl BatchSource for FixedBatches {
        fn next_batch(&mut self) -> Result<Option<Batch>> {
            let batch = self.batches.get(self.cursor).cloned();
            self.cursor += 1;
            Ok(batch)
        }

        fn reset(&mut self) {
            self.cursor = 0;
        }
    }

    /// Batch whose features, blown up to class scores, decode to
    /// `emitted` while the true labels encode `transcript`.
    fn scripted_batch(emitted: &[u32], transcript: &str) -> Batch {
        let labels = encode_transcript(transcript).unwrap();

        let mut features = Array3::from_elem((1, emitted.len(), OUTPUT_DIM), -1.0f32);
        for (t, &c) in emitted.iter().enumerate() {
            features[[0, t, c as usize]] = 1.0;
        }

        let mut label_array = Array2::from_elem((1, labels.len()), PAD_ID);
        for (j, &l) in labels.iter().enumerate() {
            label_array[[0, j]] = l;
        }

        Batch {
            features,
            input_lengths: vec![emitted.len()],
            labels: label_array,
            label_lengths: vec![labels.len()],
            transcripts: vec![transcript.to_string()],
        }
    }

    /// Frame sequence whose best-path decode equals the transcript exactly:
    /// each label id separated by blanks.
    fn exact_frames(transcript: &str) -> Vec<u32> {
        let mut frames = Vec::new();
        for id in encode_transcript(transcript).unwrap() {
            frames.push(id);
            frames.push(BLANK_ID);
        }
        frames
    }

    #[test]
    fn perfect_prediction_scores_zero_and_improves() {
        let model = EchoModel::new(vec!["ctc".to_string()]);
        let mut stream = FixedBatches::new(vec![scripted_batch(&exact_frames("cat"), "cat")]);
        let mut reporter = Reporter::new();

        let report = reporter.on_epoch_end(0, &model, &mut stream, 10).unwrap();

        assert_eq!(report.utterances, 1);
        assert_eq!(report.mean_ler, 0.0);
        assert_eq!(report.mean_wer, 0.0);
        assert!(report.improved);
        assert_eq!(reporter.best_mean_ler(), 0.0);
        assert_eq!(report.samples, vec![("cat".to_string(), "cat".to_string())]);
    }

    #[test]
    fn best_marker_moves_only_on_strict_improvement() {
        let model = EchoModel::new(vec!["ctc".to_string()]);
        let mut reporter = Reporter::new();

        // Epoch 0: one label wrong out of seven
        let mut stream = FixedBatches::new(vec![scripted_batch(&exact_frames("cat sa"), "cat sat")]);
        let first = reporter.on_epoch_end(0, &model, &mut stream, 10).unwrap();
        assert!(first.improved);
        let best = reporter.best_mean_ler();

        // Epoch 1: identical score, not a strict improvement
        stream.reset();
        let second = reporter.on_epoch_end(1, &model, &mut stream, 10).unwrap();
        assert!(!second.improved);
        assert_eq!(reporter.best_mean_ler(), best);

        // Epoch 2: exact prediction improves
        let mut perfect = FixedBatches::new(vec![scripted_batch(&exact_frames("cat sat"), "cat sat")]);
        let third = reporter.on_epoch_end(2, &model, &mut perfect, 10).unwrap();
        assert!(third.improved);
        assert_eq!(reporter.best_mean_ler(), 0.0);

        assert_eq!(reporter.mean_ler_log.len(), 3);
        assert_eq!(reporter.mean_wer_log.len(), 3);
        assert_eq!(reporter.norm_mean_ler_log.len(), 3);
    }

    #[test]
    fn cat_sat_epoch_means() {
        let model = EchoModel::new(vec!["ctc".to_string()]);
        let mut stream = FixedBatches::new(vec![scripted_batch(&exact_frames("cat sa"), "cat sat")]);
        let mut reporter = Reporter::new();

        let report = reporter.on_epoch_end(0, &model, &mut stream, 10).unwrap();

        assert!((report.mean_wer - 0.5).abs() < 1e-6);
        assert!((report.mean_ler - 1.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn valid_steps_bound_the_scored_utterances() {
        let model = EchoModel::new(vec!["ctc".to_string()]);
        let batches = vec![
            scripted_batch(&exact_frames("one"), "one"),
            scripted_batch(&exact_frames("two"), "two"),
            scripted_batch(&exact_frames("six"), "six"),
        ];
        let mut stream = FixedBatches::new(batches);
        let mut reporter = Reporter::new();

        let report = reporter.on_epoch_end(0, &model, &mut stream, 2).unwrap();

        assert_eq!(report.utterances, 2);
    }

    #[test]
    fn forced_output_does_not_move_the_marker() {
        let model = EchoModel::new(vec!["ctc".to_string()]);
        let mut reporter = Reporter::new();
        reporter.force_output = true;

        let mut stream = FixedBatches::new(vec![scripted_batch(&exact_frames("cat sa"), "cat sat")]);
        reporter.on_epoch_end(0, &model, &mut stream, 10).unwrap();
        let best = reporter.best_mean_ler();

        // A worse epoch still reports but the marker stays.
        let mut worse = FixedBatches::new(vec![scripted_batch(&exact_frames("c"), "cat sat")]);
        let report = reporter.on_epoch_end(1, &model, &mut worse, 10).unwrap();

        assert!(!report.improved);
        assert!(!report.samples.is_empty());
        assert_eq!(reporter.best_mean_ler(), best);
    }

    #[test]
    fn trimmed_network_uses_fallback_endpoint() {
        let model = EchoModel::new(vec!["out".to_string()]);
        let mut stream = FixedBatches::new(vec![scripted_batch(&exact_frames("cat"), "cat")]);
        let mut reporter = Reporter::new();

        assert!(reporter.on_epoch_end(0, &model, &mut stream, 1).is_ok());
    }

    #[test]
    fn missing_endpoints_abort_the_report() {
        let model = EchoModel::new(vec!["softmax".to_string()]);
        let mut stream = FixedBatches::new(vec![scripted_batch(&exact_frames("cat"), "cat")]);
        let mut reporter = Reporter::new();

        assert!(reporter.on_epoch_end(0, &model, &mut stream, 1).is_err());
    }
}
