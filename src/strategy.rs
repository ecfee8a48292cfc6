//! Pluggable output activation and ground-truth interpretation.
//!
//! The source dispatches these through function pointers; here they are
//! represented as tagged variants over the closed set of built-in
//! strategies plus a `Custom` escape hatch carrying a boxed closure, which
//! avoids exposing raw function-pointer plumbing while staying open to
//! extension (see spec's representation notes on strategy injection).

use std::sync::Arc;

use crate::arith::clip_sym;
use crate::error::{EngineError, Result};
use crate::params::Params;
use crate::prng::Prng;

/// Reads a little-endian unsigned integer of `width` bytes (1..=8) from the
/// front of `buf`.
pub fn read_uint_le(buf: &[u8], width: usize) -> u64 {
    let mut acc = 0u64;
    for (i, &b) in buf[..width].iter().enumerate() {
        acc |= (b as u64) << (8 * i);
    }
    acc
}

/// Writes a little-endian unsigned integer of `width` bytes (1..=8) to the
/// front of `buf`.
pub fn write_uint_le(buf: &mut [u8], width: usize, value: u64) {
    for (i, slot) in buf[..width].iter_mut().enumerate() {
        *slot = ((value >> (8 * i)) & 0xFF) as u8;
    }
}

pub type CustomActivation = Arc<dyn Fn(&[i32], &Params, &mut [u8]) -> Result<()> + Send + Sync>;
pub type CustomFeedback =
    Arc<dyn Fn(&[u8], &[i32], &Params, &mut Prng) -> (Option<usize>, Option<usize>) + Send + Sync>;

/// Converts a row of votes into the caller's `y_pred` representation.
#[derive(Clone)]
pub enum OutputActivation {
    /// Argmax over votes, ties broken by lowest index. Requires `y_size == 1`.
    ClassIndex,
    /// Per-class binary threshold: `votes[c] > mid_state`. Requires
    /// `y_size == num_classes`.
    BinaryVector,
    /// User-supplied activation with the same inputs as the built-ins.
    Custom(CustomActivation),
}

impl std::fmt::Debug for OutputActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassIndex => write!(f, "ClassIndex"),
            Self::BinaryVector => write!(f, "BinaryVector"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl OutputActivation {
    pub fn apply(&self, votes: &[i32], params: &Params, y_pred_row: &mut [u8]) -> Result<()> {
        match self {
            Self::ClassIndex => {
                if params.hyper.y_size != 1 {
                    return Err(EngineError::Misconfigured(
                        "ClassIndex output activation requires y_size == 1".into(),
                    ));
                }
                let mut best = 0usize;
                let mut best_vote = votes[0];
                for (c, &v) in votes.iter().enumerate().skip(1) {
                    if v > best_vote {
                        best_vote = v;
                        best = c;
                    }
                }
                write_uint_le(y_pred_row, params.hyper.y_element_size as usize, best as u64);
                Ok(())
            }
            Self::BinaryVector => {
                if params.hyper.y_size != params.hyper.num_classes {
                    return Err(EngineError::Misconfigured(
                        "BinaryVector output activation requires y_size == num_classes".into(),
                    ));
                }
                let width = params.hyper.y_element_size as usize;
                for (c, &v) in votes.iter().enumerate() {
                    let bit = if v > params.mid_state as i32 { 1 } else { 0 };
                    write_uint_le(&mut y_pred_row[c * width..(c + 1) * width], width, bit);
                }
                Ok(())
            }
            Self::Custom(f) => f(votes, params, y_pred_row),
        }
    }
}

/// Interprets the ground-truth label row and picks the positive/negative
/// classes for a training step, per spec's feedback orchestration.
#[derive(Clone)]
pub enum FeedbackSelection {
    /// `y_size == 1`: the label names the positive class directly.
    ClassIndex,
    /// `y_size == num_classes`: each class has its own bit.
    BinaryVector,
    /// User-supplied selection with the same inputs as the built-ins.
    Custom(CustomFeedback),
}

impl std::fmt::Debug for FeedbackSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassIndex => write!(f, "ClassIndex"),
            Self::BinaryVector => write!(f, "BinaryVector"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl FeedbackSelection {
    pub fn select(
        &self,
        y_row: &[u8],
        votes: &[i32],
        params: &Params,
        rng: &mut Prng,
    ) -> Result<(Option<usize>, Option<usize>)> {
        let threshold = params.threshold();
        match self {
            Self::ClassIndex => {
                if params.hyper.y_size != 1 {
                    return Err(EngineError::Misconfigured(
                        "ClassIndex feedback selection requires y_size == 1".into(),
                    ));
                }
                let positive = read_uint_le(y_row, params.hyper.y_element_size as usize) as usize;
                let pool = (0..params.num_classes())
                    .filter(|&c| c != positive)
                    .map(|c| (c, (clip_sym(votes[c], threshold) + threshold) as u32));
                let negative = weighted_sample(rng, pool);
                if negative.is_none() {
                    log::warn!("ClassIndex feedback selection found no negative class to sample");
                }
                Ok((Some(positive), negative))
            }
            Self::BinaryVector => {
                if params.hyper.y_size != params.hyper.num_classes {
                    return Err(EngineError::Misconfigured(
                        "BinaryVector feedback selection requires y_size == num_classes".into(),
                    ));
                }
                let width = params.hyper.y_element_size as usize;
                let bit_set = |c: usize| read_uint_le(&y_row[c * width..(c + 1) * width], width) != 0;
                let positive_pool = (0..params.num_classes())
                    .filter(|&c| bit_set(c))
                    .map(|c| (c, (clip_sym(votes[c], threshold) + threshold) as u32));
                let negative_pool = (0..params.num_classes())
                    .filter(|&c| !bit_set(c))
                    .map(|c| (c, (clip_sym(votes[c], threshold) + threshold) as u32));
                let positive = weighted_sample(rng, positive_pool);
                let negative = weighted_sample(rng, negative_pool);
                if positive.is_none() {
                    log::warn!("BinaryVector feedback selection found no positive class in the label row");
                }
                if negative.is_none() {
                    log::warn!("BinaryVector feedback selection found no negative class in the label row");
                }
                Ok((positive, negative))
            }
            Self::Custom(f) => Ok(f(y_row, votes, params, rng)),
        }
    }
}

/// Picks a sensible built-in default so an engine is immediately usable
/// without explicit strategy configuration: class-index labels for
/// `y_size == 1`, binary-vector labels otherwise.
pub(crate) fn default_output_activation(hyper: &crate::params::Hyperparams) -> OutputActivation {
    if hyper.y_size == 1 {
        OutputActivation::ClassIndex
    } else {
        OutputActivation::BinaryVector
    }
}

pub(crate) fn default_feedback_selection(hyper: &crate::params::Hyperparams) -> FeedbackSelection {
    if hyper.y_size == 1 {
        FeedbackSelection::ClassIndex
    } else {
        FeedbackSelection::BinaryVector
    }
}

/// Draws `r = next_u32() mod S` (`S` the pool's weight sum) and returns the
/// first item whose running prefix sum is `>= r`. Returns `None` if the
/// pool's total weight is zero.
pub fn weighted_sample(rng: &mut Prng, pool: impl Iterator<Item = (usize, u32)>) -> Option<usize> {
    let items: Vec<(usize, u32)> = pool.collect();
    let total: u64 = items.iter().map(|&(_, w)| w as u64).sum();
    if total == 0 {
        return None;
    }
    let r = rng.next_u32() as u64 % total;
    let mut acc = 0u64;
    for (idx, w) in items {
        acc += w as u64;
        if acc >= r {
            return Some(idx);
        }
    }
    None
}

/// Computes the per-class update probabilities for a training row:
/// `p_pos` inversely proportional to the positive class's votes, `p_neg`
/// proportional to the negative class's votes.
pub fn update_probabilities(
    votes: &[i32],
    positive: Option<usize>,
    negative: Option<usize>,
    threshold: i32,
) -> (f32, f32) {
    let two_t = (2 * threshold) as f32;
    let p_pos = positive
        .map(|c| (threshold as f32 - clip_sym(votes[c], threshold) as f32) / two_t)
        .unwrap_or(0.0);
    let p_neg = negative
        .map(|c| (clip_sym(votes[c], threshold) as f32 + threshold as f32) / two_t)
        .unwrap_or(0.0);
    (p_pos, p_neg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_sample_picks_nonzero_pool() {
        let mut rng = Prng::new(1);
        let mut seen = [0u32; 3];
        for _ in 0..1_000 {
            let pool = [(0usize, 1u32), (1, 0), (2, 3)].into_iter();
            if let Some(idx) = weighted_sample(&mut rng, pool) {
                seen[idx] += 1;
            }
        }
        assert_eq!(seen[1], 0, "zero-weight class must never be picked");
        assert!(seen[0] > 0 && seen[2] > 0);
    }

    #[test]
    fn weighted_sample_empty_pool_is_none() {
        let mut rng = Prng::new(1);
        let pool: std::iter::Empty<(usize, u32)> = std::iter::empty();
        assert_eq!(weighted_sample(&mut rng, pool), None);
    }

    #[test]
    fn class_index_output_is_argmax_lowest_index_on_tie() {
        let hyper = crate::params::Hyperparams {
            num_classes: 3,
            threshold: 10,
            num_literals: 4,
            num_clauses: 1,
            max_state: 127,
            min_state: -127,
            boost_true_positive_feedback: false,
            s: 2.0,
            y_size: 1,
            y_element_size: 4,
        };
        let params = Params::new(hyper).unwrap();
        let mut row = [0u8; 4];
        OutputActivation::ClassIndex.apply(&[1, 3, 3], &params, &mut row).unwrap();
        assert_eq!(read_uint_le(&row, 4), 1);
    }
}
