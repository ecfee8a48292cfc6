//! Hyperparameters and the derived constants shared by every engine variant.

use crate::error::{EngineError, Result};

/// Caller-supplied hyperparameters for a Tsetlin Machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperparams {
    pub num_classes: u32,
    pub threshold: i32,
    pub num_literals: u32,
    pub num_clauses: u32,
    pub max_state: i8,
    pub min_state: i8,
    pub boost_true_positive_feedback: bool,
    pub s: f64,
    pub y_size: u32,
    pub y_element_size: u32,
}

/// Validated hyperparameters plus the constants derived from them.
///
/// `Params` is cheap to copy and is shared (by value) across the engine's
/// hot paths; validation happens once, at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    pub hyper: Hyperparams,
    pub mid_state: i8,
    pub s_inv: f32,
    pub s_m1_inv: f32,
    pub sparse_min_state: i8,
    pub sparse_init_state: i8,
    pub active_row_stride: usize,
}

impl Params {
    pub fn new(hyper: Hyperparams) -> Result<Self> {
        if hyper.min_state >= hyper.max_state {
            return Err(EngineError::InvalidHyperparams(format!(
                "min_state ({}) must be < max_state ({})",
                hyper.min_state, hyper.max_state
            )));
        }
        if hyper.num_classes == 0 || hyper.num_literals == 0 || hyper.num_clauses == 0 {
            return Err(EngineError::InvalidHyperparams(
                "num_classes, num_literals and num_clauses must all be nonzero".into(),
            ));
        }
        if !(hyper.s > 1.0) {
            return Err(EngineError::InvalidHyperparams(format!(
                "s ({}) must be > 1.0",
                hyper.s
            )));
        }
        if hyper.threshold <= 0 {
            return Err(EngineError::InvalidHyperparams(format!(
                "threshold ({}) must be > 0",
                hyper.threshold
            )));
        }

        let mid_state = ((hyper.max_state as i16 + hyper.min_state as i16) / 2) as i8;
        let s_inv = (1.0 / hyper.s) as f32;
        let s_m1_inv = ((hyper.s - 1.0) / hyper.s) as f32;

        let sparse_min_state = (mid_state as i16 - 40).max(hyper.min_state as i16) as i8;
        let sparse_init_state = (sparse_min_state as i16 + 5).min(hyper.max_state as i16) as i8;

        let active_row_stride = hyper.num_literals.div_ceil(8) as usize;

        Ok(Self {
            hyper,
            mid_state,
            s_inv,
            s_m1_inv,
            sparse_min_state,
            sparse_init_state,
            active_row_stride,
        })
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.hyper.num_classes as usize
    }

    #[inline]
    pub fn num_literals(&self) -> usize {
        self.hyper.num_literals as usize
    }

    #[inline]
    pub fn num_clauses(&self) -> usize {
        self.hyper.num_clauses as usize
    }

    #[inline]
    pub fn num_ta(&self) -> usize {
        2 * self.num_literals()
    }

    #[inline]
    pub fn threshold(&self) -> i32 {
        self.hyper.threshold
    }
}

/// Test-only fixture generation, in the shape of the teacher's own
/// `Arbitrary` trait, generalized to thread a caller-owned [`crate::Prng`]
/// rather than a thread-local source, since fixtures built from the
/// engine's own deterministic generator reproduce exactly given a seed.
#[cfg(test)]
pub(crate) trait Arbitrary {
    fn random(rng: &mut crate::prng::Prng) -> Self;
}

#[cfg(test)]
impl Arbitrary for Hyperparams {
    /// Always produces hyperparameters `Params::new` accepts.
    fn random(rng: &mut crate::prng::Prng) -> Self {
        Hyperparams {
            num_classes: 2 + rng.next_below(3),
            threshold: 5 + rng.next_below(20) as i32,
            num_literals: 4 + rng.next_below(12),
            num_clauses: 4 + rng.next_below(20),
            max_state: 127,
            min_state: -127,
            boost_true_positive_feedback: rng.next_f32() < 0.5,
            s: 1.5 + rng.next_f32() as f64 * 3.0,
            y_size: 1,
            y_element_size: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Hyperparams {
        Hyperparams {
            num_classes: 2,
            threshold: 10,
            num_literals: 8,
            num_clauses: 4,
            max_state: 127,
            min_state: -127,
            boost_true_positive_feedback: false,
            s: 3.0,
            y_size: 1,
            y_element_size: 4,
        }
    }

    #[test]
    fn derives_mid_state_and_inverses() {
        let p = Params::new(base()).unwrap();
        assert_eq!(p.mid_state, 0);
        assert!((p.s_inv - (1.0 / 3.0)).abs() < 1e-6);
        assert!((p.s_m1_inv - (2.0 / 3.0)).abs() < 1e-6);
        assert_eq!(p.sparse_min_state, -40);
        assert_eq!(p.sparse_init_state, -35);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut h = base();
        h.min_state = 10;
        h.max_state = 5;
        assert!(Params::new(h).is_err());
    }

    #[test]
    fn rejects_s_not_greater_than_one() {
        let mut h = base();
        h.s = 1.0;
        assert!(Params::new(h).is_err());
    }

    #[test]
    fn active_row_stride_rounds_up() {
        let mut h = base();
        h.num_literals = 9;
        let p = Params::new(h).unwrap();
        assert_eq!(p.active_row_stride, 2);
    }

    #[test]
    fn arbitrary_hyperparams_always_validate() {
        let mut rng = crate::prng::Prng::new(123);
        for _ in 0..200 {
            let h = Hyperparams::random(&mut rng);
            let p = Params::new(h).unwrap();
            assert!(p.mid_state >= h.min_state && p.mid_state <= h.max_state);
            assert_eq!(p.active_row_stride, h.num_literals.div_ceil(8) as usize);
        }
    }
}
