//! CTC best-path decoding and loss.
//!
//! Decoding takes the per-timestep argmax class, collapses consecutive
//! repeats, then removes the blank. The loss is the standard log-space
//! forward-backward over the blank-expanded label sequence, returning the
//! gradient with respect to the logits for training.

use crate::error::Result;
use ndarray::prelude::*;
use ndarray_stats::QuantileExt;

/// Apply log-softmax to each row of a (frames, classes) array.
pub fn log_softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;
        row.mapv_inplace(|x| x - log_sum);
    }
    out
}

/// CTC best-path decode over the first `input_len` timesteps.
///
/// Deterministic and idempotent: identical inputs yield identical label
/// sequences. Padded timesteps beyond `input_len` never contribute.
pub fn best_path_decode(
    probs: ArrayView2<f32>,
    input_len: usize,
    blank: u32,
) -> Result<Vec<u32>> {
    let steps = input_len.min(probs.nrows());
    let mut decoded = Vec::new();
    let mut last = blank;

    for t in 0..steps {
        let token = probs.row(t).argmax()? as u32;
        if token != last && token != blank {
            decoded.push(token);
        }
        last = token;
    }

    Ok(decoded)
}

/// Log-space addition: ln(exp(a) + exp(b)).
fn log_add(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// Blank-expanded label sequence: blank, l1, blank, l2, ..., blank.
fn expand_labels(labels: &[u32], blank: u32) -> Vec<u32> {
    let mut expanded = Vec::with_capacity(labels.len() * 2 + 1);
    expanded.push(blank);
    for &l in labels {
        expanded.push(l);
        expanded.push(blank);
    }
    expanded
}

/// CTC loss and gradient for one utterance.
///
/// `log_probs` holds log-softmaxed logits for the valid frames only
/// (input_len, classes). Returns the negative log-likelihood and
/// d(loss)/d(logits) of the same shape. A label sequence too long to align
/// with the frame count yields an infinite loss and a zero gradient.
pub fn ctc_loss_grad(
    log_probs: ArrayView2<f32>,
    labels: &[u32],
    blank: u32,
) -> (f32, Array2<f32>) {
    let frames = log_probs.nrows();
    let classes = log_probs.ncols();
    let expanded = expand_labels(labels, blank);
    let s = expanded.len();

    if frames == 0 {
        return (f32::INFINITY, Array2::zeros((frames, classes)));
    }

    let lp = |t: usize, sym: u32| log_probs[[t, sym as usize]];

    // skip from s-2 is allowed when the symbols differ and s is not a blank
    let can_skip = |i: usize| {
        i >= 2 && expanded[i] != blank && expanded[i] != expanded[i - 2]
    };

    let mut alpha = Array2::from_elem((frames, s), f32::NEG_INFINITY);
    alpha[[0, 0]] = lp(0, expanded[0]);
    if s > 1 {
        alpha[[0, 1]] = lp(0, expanded[1]);
    }

    for t in 1..frames {
        for i in 0..s {
            let mut acc = alpha[[t - 1, i]];
            if i >= 1 {
                acc = log_add(acc, alpha[[t - 1, i - 1]]);
            }
            if can_skip(i) {
                acc = log_add(acc, alpha[[t - 1, i - 2]]);
            }
            alpha[[t, i]] = acc + lp(t, expanded[i]);
        }
    }

    let mut log_lik = alpha[[frames - 1, s - 1]];
    if s > 1 {
        log_lik = log_add(log_lik, alpha[[frames - 1, s - 2]]);
    }

    if log_lik == f32::NEG_INFINITY {
        return (f32::INFINITY, Array2::zeros((frames, classes)));
    }

    let mut beta = Array2::from_elem((frames, s), f32::NEG_INFINITY);
    beta[[frames - 1, s - 1]] = lp(frames - 1, expanded[s - 1]);
    if s > 1 {
        beta[[frames - 1, s - 2]] = lp(frames - 1, expanded[s - 2]);
    }

    for t in (0..frames - 1).rev() {
        for i in 0..s {
            let mut acc = beta[[t + 1, i]];
            if i + 1 < s {
                acc = log_add(acc, beta[[t + 1, i + 1]]);
            }
            if i + 2 < s && can_skip(i + 2) {
                acc = log_add(acc, beta[[t + 1, i + 2]]);
            }
            beta[[t, i]] = acc + lp(t, expanded[i]);
        }
    }

    // d(-ln p)/d(logit[t][k]) = softmax[t][k] - sum over expanded positions
    // labeled k of exp(alpha + beta - lp - ln p)
    let mut grad = log_probs.mapv(f32::exp);
    for t in 0..frames {
        let mut occupancy = vec![f32::NEG_INFINITY; classes];
        for i in 0..s {
            let k = expanded[i] as usize;
            occupancy[k] = log_add(
                occupancy[k],
                alpha[[t, i]] + beta[[t, i]] - lp(t, expanded[i]),
            );
        }
        for k in 0..classes {
            grad[[t, k]] -= (occupancy[k] - log_lik).exp();
        }
    }

    (-log_lik, grad)
}
