//! Edit-distance metrics: WER, LER, and normalized LER.

/// Levenshtein edit distance between two sequences.
pub fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let cost = if x == y { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Per-utterance error rates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricRecord {
    /// Edit distance over label ids, divided by the true length
    pub ler: f32,
    /// Edit distance over words, divided by the true word count
    pub wer: f32,
    /// Edit distance over label ids, divided by max(pred, true) length
    pub norm_ler: f32,
}

/// Normalize a distance by a denominator, keeping the raw distance when the
/// denominator is zero.
fn rate(distance: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        distance as f32
    } else {
        distance as f32 / denominator as f32
    }
}

/// Score one predicted/true pair in label-id and word space.
pub fn score(pred_ids: &[u32], true_ids: &[u32], pred_text: &str, true_text: &str) -> MetricRecord {
    let label_distance = levenshtein(pred_ids, true_ids);

    let pred_words: Vec<&str> = pred_text.split_whitespace().collect();
    let true_words: Vec<&str> = true_text.split_whitespace().collect();
    let word_distance = levenshtein(&pred_words, &true_words);

    let max_len = pred_ids.len().max(true_ids.len());

    MetricRecord {
        ler: rate(label_distance, true_ids.len()),
        wer: rate(word_distance, true_words.len()),
        norm_ler: if max_len == 0 {
            0.0
        } else {
            label_distance as f32 / max_len as f32
        },
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::encode_transcript;

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein(&b"kitten"[..], &b"sitting"[..]), 3);
        assert_eq!(levenshtein(&b""[..], &b"abc"[..]), 3);
        assert_eq!(levenshtein(&b"abc"[..], &b"abc"[..]), 0);
    }

    #[test]
    fn identical_sequences_score_zero() {
        let ids = encode_transcript("cat sat").unwrap();
        let record = score(&ids, &ids, "cat sat", "cat sat");

        assert_eq!(record.ler, 0.0);
        assert_eq!(record.wer, 0.0);
        assert_eq!(record.norm_ler, 0.0);
    }

    #[test]
    fn cat_sat_scenario() {
        // true "CAT SAT", predicted "CAT SA": one of two words differs,
        // one deletion over seven label ids.
        let true_ids = encode_transcript("cat sat").unwrap();
        let pred_ids = encode_transcript("cat sa").unwrap();

        let record = score(&pred_ids, &true_ids, "cat sa", "cat sat");

        assert!((record.wer - 0.5).abs() < 1e-6);
        assert!((record.ler - 1.0 / 7.0).abs() < 1e-6);
        assert!((record.norm_ler - 1.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn zero_true_length_keeps_raw_distance() {
        let pred_ids = encode_transcript("ab").unwrap();
        let record = score(&pred_ids, &[], "ab", "");

        assert_eq!(record.ler, 2.0);
        assert_eq!(record.wer, 1.0);
        assert_eq!(record.norm_ler, 1.0);
    }

    #[test]
    fn norm_ler_is_bounded() {
        let true_ids = encode_transcript("a").unwrap();
        let pred_ids = encode_transcript("completely different").unwrap();

        let record = score(&pred_ids, &true_ids, "completely different", "a");

        assert!(record.ler > 1.0);
        assert!(record.norm_ler <= 1.0);
        assert!(record.norm_ler >= 0.0);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }
}
