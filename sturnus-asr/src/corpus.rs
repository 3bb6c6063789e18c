//! Corpus table assembly from CSV descriptors.
//!
//! Descriptors use the DeepSpeech CSV layout with a header row of
//! `wav_filename,wav_filesize,transcript`. Several descriptors combine into
//! one table, sorted by utterance duration ascending so early batches carry
//! short sequences.

use crate::error::{CorpusError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// WAV header size assumed when deriving duration from file size.
const WAV_HEADER_BYTES: u64 = 44;

/// Payload bytes per second of 16kHz 16-bit mono audio.
const BYTES_PER_SECOND: f32 = 32_000.0;

#[derive(Debug, Deserialize)]
struct CsvRow {
    wav_filename: String,
    wav_filesize: u64,
    transcript: String,
}

/// One labeled utterance. Immutable once loaded from the corpus table.
#[derive(Clone, Debug)]
pub struct Utterance {
    /// Path to the 16kHz mono WAV file
    pub wav_path: PathBuf,
    /// Ground-truth transcript
    pub transcript: String,
    /// Audio duration in seconds, derived from the descriptor
    pub duration_secs: f32,
}

/// Aggregate statistics over a corpus table.
#[derive(Clone, Copy, Debug, Default)]
pub struct CorpusStats {
    pub utterances: usize,
    pub total_duration_secs: f32,
    pub mean_duration_secs: f32,
}

/// Table of utterances combined from one or more CSV descriptors.
#[derive(Debug)]
pub struct CorpusTable {
    pub utterances: Vec<Utterance>,
    pub stats: CorpusStats,
}

impl CorpusTable {
    /// Combine a comma-separated list of CSV descriptor paths into one table.
    ///
    /// # Errors
    ///
    /// Fatal if any descriptor cannot be parsed (the error names the path)
    /// or if the combined table is empty.
    pub fn from_csv_files(files: &str) -> Result<Self> {
        let paths: Vec<&str> = files.split(',').map(str::trim).collect();

        let mut utterances = Vec::new();

        for path in &paths {
            read_descriptor(Path::new(path), &mut utterances)?;
        }

        if utterances.is_empty() {
            return Err(CorpusError::Empty {
                files: files.to_string(),
            }
            .into());
        }

        utterances.sort_by(|a, b| a.duration_secs.total_cmp(&b.duration_secs));

        let total: f32 = utterances.iter().map(|u| u.duration_secs).sum();
        let stats = CorpusStats {
            utterances: utterances.len(),
            total_duration_secs: total,
            mean_duration_secs: total / utterances.len() as f32,
        };

        tracing::info!(
            files,
            utterances = stats.utterances,
            total_secs = stats.total_duration_secs,
            "corpus table assembled"
        );

        Ok(Self { utterances, stats })
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }
}

fn read_descriptor(path: &Path, out: &mut Vec<Utterance>) -> Result<()> {
    let parse_err = |source| CorpusError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(parse_err)?;

    // WAV paths in descriptors are relative to the descriptor's directory.
    let base = path.parent().unwrap_or(Path::new(""));

    for record in reader.deserialize() {
        let row: CsvRow = record.map_err(parse_err)?;

        let payload = row.wav_filesize.saturating_sub(WAV_HEADER_BYTES);

        out.push(Utterance {
            wav_path: base.join(row.wav_filename),
            transcript: row.transcript,
            duration_secs: payload as f32 / BYTES_PER_SECOND,
        });
    }

    Ok(())
}
