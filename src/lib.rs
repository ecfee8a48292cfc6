//! On-device training and inference engine for Tsetlin Machine classifiers.
//!
//! Three engine variants share the same clause/vote semantics but trade off
//! memory and trainability differently:
//!
//! - [`DenseEngine`]: every automaton counter stored flat, trainable.
//! - [`SparseEngine`]: only automata past a sparsity floor are kept, per
//!   clause, as a sorted `(ta_id, ta_state)` list, trainable.
//! - [`StatelessEngine`]: only the bare included `ta_id`s are kept, no
//!   training; built exclusively by cross-loading a dense model file.
//!
//! The engine is single-threaded and deterministic: a fixed seed and a
//! fixed row visitation order fully determine a training run's trajectory,
//! since every probabilistic decision is drawn from exactly one [`Prng`]
//! instance owned by the engine (see [`prng`]).

pub mod arith;
pub mod clause;
pub mod codec;
pub mod dense;
pub mod error;
pub mod params;
pub mod prng;
pub mod sparse;
pub mod stateless;
pub mod strategy;
mod util;

pub use dense::DenseEngine;
pub use error::{EngineError, Result};
pub use params::{Hyperparams, Params};
pub use prng::Prng;
pub use sparse::SparseEngine;
pub use stateless::StatelessEngine;
pub use strategy::{FeedbackSelection, OutputActivation};
