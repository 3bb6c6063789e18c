//! Padded mini-batch assembly from the corpus table.
//!
//! Feature sequences inside a batch are zero-padded to the batch-local
//! maximum length and label sequences pad-filled to the local maximum label
//! length. The true pre-pad lengths are recorded at assembly time; CTC loss
//! masking and decoding depend on them and they are never re-derived from
//! padded content.

use crate::corpus::{CorpusTable, Utterance};
use crate::error::{CorpusError, Result};
use crate::features::{FeatureMode, FeatureSource};
use crate::vocab::{self, PAD_ID};
use ndarray::{Array2, Array3, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::sync::mpsc;

/// One padded mini-batch. Immutable once handed off.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Zero-padded features, shape (batch, max_len, feature_dim)
    pub features: Array3<f32>,
    /// True feature length per utterance, before padding
    pub input_lengths: Vec<usize>,
    /// Pad-filled label ids, shape (batch, max_label_len)
    pub labels: Array2<u32>,
    /// True label length per utterance, before padding
    pub label_lengths: Vec<usize>,
    /// Original transcripts, for reporting
    pub transcripts: Vec<String>,
}

impl Batch {
    pub fn size(&self) -> usize {
        self.features.shape()[0]
    }

    /// True label ids of utterance `i`, without padding.
    pub fn label_ids(&self, i: usize) -> Vec<u32> {
        self.labels
            .row(i)
            .iter()
            .take(self.label_lengths[i])
            .copied()
            .collect()
    }
}

/// A resettable stream of batches.
pub trait BatchSource {
    /// Produce the next batch, `None` when a bounded stream is exhausted.
    fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Rewind to the start. The validation stream is rewound at every epoch
    /// boundary; infinite streams may treat this as a no-op.
    fn reset(&mut self);
}

/// Batch stream over a shared corpus table.
///
/// Training mode cycles forever, reshuffling the utterance order at the
/// start of every full pass. Evaluation mode covers the table once in fixed
/// order, then yields `None` until [`BatchStream::reset`]. Streams keep
/// independent cursors, so a training and a validation stream over the same
/// table interleave safely.
pub struct BatchStream<S> {
    table: Arc<CorpusTable>,
    source: S,
    mode: FeatureMode,
    batch_size: usize,
    training: bool,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl<S: FeatureSource> BatchStream<S> {
    pub fn new(
        table: Arc<CorpusTable>,
        source: S,
        mode: FeatureMode,
        batch_size: usize,
        training: bool,
        seed: u64,
    ) -> Self {
        let mut stream = Self {
            order: (0..table.len()).collect(),
            table,
            source,
            mode,
            batch_size,
            training,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        };

        if stream.training {
            stream.order.shuffle(&mut stream.rng);
        }

        stream
    }

    /// Feature mode this stream assembles.
    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    fn assemble(&self, indices: &[usize]) -> Result<Option<Batch>> {
        let mut rows: Vec<(ndarray::Array2<f32>, Vec<u32>, String)> = Vec::new();

        for &idx in indices {
            let utterance = &self.table.utterances[idx];

            let Some(label_ids) = vocab::encode_transcript(&utterance.transcript) else {
                warn_skip(utterance, "transcript cannot be encoded into label ids");
                continue;
            };

            let features = match self.source.features(utterance, self.mode) {
                Ok(features) => features,
                Err(e) => {
                    warn_skip(utterance, &format!("feature extraction failed: {e}"));
                    continue;
                }
            };

            if features.nrows() == 0 {
                warn_skip(utterance, "derived feature length is zero");
                continue;
            }

            rows.push((features, label_ids, utterance.transcript.clone()));
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let max_len = rows.iter().map(|(f, ..)| f.nrows()).max().unwrap_or(0);
        let max_label_len = rows.iter().map(|(_, l, _)| l.len()).max().unwrap_or(0);
        let dim = self.mode.dim();

        let mut features = Array3::<f32>::zeros((rows.len(), max_len, dim));
        let mut labels = Array2::<u32>::from_elem((rows.len(), max_label_len), PAD_ID);
        let mut input_lengths = Vec::with_capacity(rows.len());
        let mut label_lengths = Vec::with_capacity(rows.len());
        let mut transcripts = Vec::with_capacity(rows.len());

        for (i, (utterance_features, label_ids, transcript)) in rows.into_iter().enumerate() {
            let len = utterance_features.nrows();
            features
                .slice_mut(s![i, ..len, ..])
                .assign(&utterance_features);

            for (j, &id) in label_ids.iter().enumerate() {
                labels[[i, j]] = id;
            }

            input_lengths.push(len);
            label_lengths.push(label_ids.len());
            transcripts.push(transcript);
        }

        Ok(Some(Batch {
            features,
            input_lengths,
            labels,
            label_lengths,
            transcripts,
        }))
    }
}

fn warn_skip(utterance: &Utterance, reason: &str) {
    tracing::warn!(
        wav = %utterance.wav_path.display(),
        reason,
        "skipping utterance"
    );
}

impl<S: FeatureSource> BatchSource for BatchStream<S> {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        // Utterances consumed in this call without yielding a batch.
        let mut consumed = 0usize;

        loop {
            if self.cursor >= self.order.len() {
                if !self.training {
                    return Ok(None);
                }

                // Wrapping with a full table's worth consumed means the
                // pass just finished yielded nothing; cycling again would
                // spin forever.
                if consumed >= self.order.len() {
                    return Err(CorpusError::Unusable {
                        count: self.order.len(),
                    }
                    .into());
                }

                self.reset();
            }

            let end = (self.cursor + self.batch_size).min(self.order.len());
            let indices = self.order[self.cursor..end].to_vec();
            self.cursor = end;
            consumed += indices.len();

            // A batch where every member was skipped is skipped whole.
            if let Some(batch) = self.assemble(&indices)? {
                return Ok(Some(batch));
            }
        }
    }

    /// Rewind to the start; training mode also reshuffles.
    fn reset(&mut self) {
        self.cursor = 0;
        if self.training {
            self.order.shuffle(&mut self.rng);
        }
    }
}

/// Prefetching wrapper around a training stream.
///
/// A worker thread assembles batches ahead of the consumer behind a bounded
/// queue; handed-off batches are immutable.
pub struct PrefetchStream {
    receiver: mpsc::Receiver<Result<Batch>>,
}

impl PrefetchStream {
    pub fn spawn<S>(mut stream: BatchStream<S>, depth: usize) -> Self
    where
        S: FeatureSource + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(depth);

        std::thread::spawn(move || {
            loop {
                match stream.next_batch() {
                    Ok(Some(batch)) => {
                        if sender.send(Ok(batch)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = sender.send(Err(e));
                        break;
                    }
                }
            }
        });

        Self { receiver }
    }
}

impl BatchSource for PrefetchStream {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        match self.receiver.recv() {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// The wrapped training stream cycles and reshuffles on its own; there
    /// is no position to rewind.
    fn reset(&mut self) {}
}
