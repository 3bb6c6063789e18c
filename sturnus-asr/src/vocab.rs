//! Character vocabulary for English CTC labels.
//!
//! The id space is fixed: space = 0, `a`..`z` = 1..=26, apostrophe = 27.
//! Id 28 is the reserved CTC blank and id 29 pads label sequences; both are
//! disjoint from the valid label range.

/// Number of valid label ids (space + 26 letters + apostrophe).
pub const VOCAB_SIZE: usize = 28;

/// Reserved CTC blank id, removed during decoding.
pub const BLANK_ID: u32 = 28;

/// Label padding id, distinct from all valid ids and the blank.
pub const PAD_ID: u32 = 29;

/// Network output dimension: valid labels plus the blank.
pub const OUTPUT_DIM: usize = VOCAB_SIZE + 1;

/// Encode a transcript into label ids, case-insensitively.
///
/// Returns `None` when any character has no label id, so callers can skip
/// the utterance rather than silently dropping characters.
pub fn encode_transcript(text: &str) -> Option<Vec<u32>> {
    text.chars()
        .map(|c| match c.to_ascii_lowercase() {
            ' ' => Some(0),
            'a'..='z' => Some(c.to_ascii_lowercase() as u32 - 'a' as u32 + 1),
            '\'' => Some(27),
            _ => None,
        })
        .collect()
}

/// Decode label ids back to text. Blank and pad ids are dropped.
pub fn decode_labels(ids: &[u32]) -> String {
    ids.iter()
        .filter_map(|&id| match id {
            0 => Some(' '),
            1..=26 => Some((b'a' + (id as u8 - 1)) as char),
            27 => Some('\''),
            _ => None,
        })
        .collect()
}
