//! Dense Tsetlin Machine engine: flat counter array, trainable.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::arith::{sat_dec_i8, sat_grow_weight, sat_inc_i8, sat_shrink_weight};
use crate::clause::{dense_clause_output, literal_correct, sum_votes};
use crate::codec;
use crate::error::Result;
use crate::params::Params;
use crate::prng::Prng;
use crate::strategy::{
    default_feedback_selection, default_output_activation, update_probabilities, FeedbackSelection,
    OutputActivation,
};
use crate::util::try_vec;

/// Trainable dense Tsetlin Machine: every automaton counter is stored,
/// included or not. See spec's dense engine component.
#[derive(Debug)]
pub struct DenseEngine {
    params: Params,
    rng: Prng,
    /// `[num_clauses * num_literals * 2]`, flat.
    ta_state: Vec<i8>,
    /// `[num_clauses * num_classes]`, flat.
    weights: Vec<i16>,
    clause_outputs: Vec<bool>,
    votes: Vec<i32>,
    output_activation: OutputActivation,
    feedback_selection: FeedbackSelection,
}

impl DenseEngine {
    /// Randomly initializes clauses and weights per spec's construction
    /// rules: each automaton counter starts one step to either side of
    /// `mid_state` by a fair coin flip, and each weight starts at `±1`.
    pub fn create(params: Params, seed: u32) -> Result<Self> {
        let k = params.num_clauses();
        let l = params.num_literals();
        let c = params.num_classes();

        let mut rng = Prng::new(seed);
        let mut ta_state = try_vec(k * 2 * l, 0i8)?;
        for clause in 0..k {
            let base = clause * 2 * l;
            for lit in 0..l {
                let heads = rng.next_f32() < 0.5;
                let (pos, neg) = if heads {
                    (params.mid_state.saturating_sub(1), params.mid_state)
                } else {
                    (params.mid_state, params.mid_state.saturating_sub(1))
                };
                ta_state[base + 2 * lit] = pos;
                ta_state[base + 2 * lit + 1] = neg;
            }
        }

        let mut weights = try_vec(k * c, 0i16)?;
        for w in weights.iter_mut() {
            *w = if rng.next_f32() < 0.5 { 1 } else { -1 };
        }

        log::info!(
            "created dense engine: {} clauses, {} literals, {} classes",
            k,
            l,
            c
        );

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            feedback_selection: default_feedback_selection(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            ta_state,
            weights,
            params,
            rng,
        })
    }

    /// Loads a native dense model file. The loaded engine's PRNG is seeded
    /// to a fixed default (`1`); call [`DenseEngine::set_seed`] before
    /// resuming training if a specific trajectory is required.
    pub fn load(path: impl AsRef<Path>, y_size: u32, y_element_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let params = codec::read_header(&mut r, y_size, y_element_size)?;
        let weights = codec::read_weights(&mut r, params.num_clauses() * params.num_classes())?;
        let ta_state = codec::read_ta_state(&mut r, params.num_clauses() * params.num_ta())?;

        let k = params.num_clauses();
        let c = params.num_classes();
        log::info!("loaded dense engine from disk: {} clauses, {} classes", k, c);

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            feedback_selection: default_feedback_selection(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            ta_state,
            weights,
            params,
            rng: Prng::new(1),
        })
    }

    /// Writes the dense binary layout (header, weights, then the flat
    /// counter array).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        codec::write_header(&mut w, &self.params)?;
        codec::write_weights(&mut w, &self.weights)?;
        codec::write_ta_state(&mut w, &self.ta_state)?;
        w.flush()?;
        log::info!("saved dense engine to disk");
        Ok(())
    }

    pub fn set_output_activation(&mut self, activation: OutputActivation) {
        self.output_activation = activation;
    }

    pub fn set_feedback_selection(&mut self, selection: FeedbackSelection) {
        self.feedback_selection = selection;
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.rng = Prng::new(seed);
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn ta_state(&self) -> &[i8] {
        &self.ta_state
    }

    pub fn weights(&self) -> &[i16] {
        &self.weights
    }

    /// Which clauses fired on the most recent `predict`/`train` row.
    pub fn clause_outputs(&self) -> &[bool] {
        &self.clause_outputs
    }

    fn eval_clauses(&mut self, x_row: &[u8], skip_empty: bool) {
        let l2 = self.params.num_ta();
        for (ci, out) in self.clause_outputs.iter_mut().enumerate() {
            let row = &self.ta_state[ci * l2..(ci + 1) * l2];
            *out = dense_clause_output(row, self.params.mid_state, x_row, skip_empty);
        }
    }

    fn type_1a(&mut self, ci: usize, w_idx: usize, x_row: &[u8]) {
        self.weights[w_idx] = sat_grow_weight(self.weights[w_idx]);

        let l2 = self.params.num_ta();
        let base = ci * l2;
        let boost = self.params.hyper.boost_true_positive_feedback;
        let max_s = self.params.hyper.max_state;
        let min_s = self.params.hyper.min_state;
        let s_m1_inv = self.params.s_m1_inv;
        let s_inv = self.params.s_inv;

        for i in 0..l2 {
            let correct = literal_correct(x_row, i as u32);
            let state = self.ta_state[base + i];
            if correct {
                if boost || self.rng.next_f32() < s_m1_inv {
                    self.ta_state[base + i] = sat_inc_i8(state, max_s);
                }
            } else if self.rng.next_f32() < s_inv {
                self.ta_state[base + i] = sat_dec_i8(state, min_s);
            }
        }
    }

    fn type_1b(&mut self, ci: usize) {
        let l2 = self.params.num_ta();
        let base = ci * l2;
        let min_s = self.params.hyper.min_state;
        let s_inv = self.params.s_inv;

        for i in 0..l2 {
            if self.rng.next_f32() < s_inv {
                self.ta_state[base + i] = sat_dec_i8(self.ta_state[base + i], min_s);
            }
        }
    }

    fn type_2(&mut self, ci: usize, w_idx: usize, x_row: &[u8]) {
        self.weights[w_idx] = sat_shrink_weight(self.weights[w_idx]);

        let l2 = self.params.num_ta();
        let base = ci * l2;
        let max_s = self.params.hyper.max_state;
        let mid = self.params.mid_state;

        for i in 0..l2 {
            let state = self.ta_state[base + i];
            if state < mid && !literal_correct(x_row, i as u32) {
                self.ta_state[base + i] = sat_inc_i8(state, max_s);
            }
        }
    }

    fn apply_feedback(&mut self, ci: usize, class: usize, is_positive: bool, x_row: &[u8]) {
        let c = self.params.num_classes();
        let w_idx = ci * c + class;
        let out = self.clause_outputs[ci];
        let w_is_positive = self.weights[w_idx] >= 0;

        if w_is_positive == is_positive {
            if out {
                self.type_1a(ci, w_idx, x_row);
            } else {
                self.type_1b(ci);
            }
        } else if out {
            self.type_2(ci, w_idx, x_row);
        }
    }

    fn train_row(&mut self, x_row: &[u8], y_row: &[u8]) -> Result<()> {
        self.eval_clauses(x_row, false);
        sum_votes(
            &mut self.votes,
            &self.clause_outputs,
            &self.weights,
            self.params.num_classes(),
            self.params.threshold(),
        );

        let (positive, negative) = self
            .feedback_selection
            .select(y_row, &self.votes, &self.params, &mut self.rng)?;
        let (p_pos, p_neg) = update_probabilities(&self.votes, positive, negative, self.params.threshold());

        for ci in 0..self.params.num_clauses() {
            if let Some(pc) = positive {
                if self.rng.next_f32() < p_pos {
                    self.apply_feedback(ci, pc, true, x_row);
                }
            }
            if let Some(nc) = negative {
                if self.rng.next_f32() < p_neg {
                    self.apply_feedback(ci, nc, false, x_row);
                }
            }
        }
        Ok(())
    }

    /// Trains for `epochs` passes over `rows` rows of `x`/`y`, visiting
    /// rows in the order supplied.
    pub fn train(&mut self, x: &[u8], y: &[u8], rows: usize, epochs: usize) -> Result<()> {
        let l = self.params.num_literals();
        let y_stride = (self.params.hyper.y_size * self.params.hyper.y_element_size) as usize;

        log::info!("training dense engine: {rows} rows x {epochs} epochs");
        for epoch in 0..epochs {
            for r in 0..rows {
                let x_row = &x[r * l..(r + 1) * l];
                let y_row = &y[r * y_stride..(r + 1) * y_stride];
                self.train_row(x_row, y_row)?;
            }
            log::debug!("dense engine completed epoch {epoch}");
        }
        Ok(())
    }

    /// Writes predictions for `rows` rows of `x` into `y_pred`.
    pub fn predict(&mut self, x: &[u8], y_pred: &mut [u8], rows: usize) -> Result<()> {
        let l = self.params.num_literals();
        let y_stride = (self.params.hyper.y_size * self.params.hyper.y_element_size) as usize;

        for r in 0..rows {
            let x_row = &x[r * l..(r + 1) * l];
            self.eval_clauses(x_row, true);
            sum_votes(
                &mut self.votes,
                &self.clause_outputs,
                &self.weights,
                self.params.num_classes(),
                self.params.threshold(),
            );
            let y_pred_row = &mut y_pred[r * y_stride..(r + 1) * y_stride];
            self.output_activation.apply(&self.votes, &self.params, y_pred_row)?;
        }
        Ok(())
    }

    /// Runs `predict` then counts rows whose prediction matches `y` under
    /// raw byte equality.
    pub fn evaluate(&mut self, x: &[u8], y: &[u8], rows: usize) -> Result<u32> {
        let y_stride = (self.params.hyper.y_size * self.params.hyper.y_element_size) as usize;
        let mut y_pred = try_vec(rows * y_stride, 0u8)?;
        self.predict(x, &mut y_pred, rows)?;

        let correct = (0..rows)
            .filter(|&r| y[r * y_stride..(r + 1) * y_stride] == y_pred[r * y_stride..(r + 1) * y_stride])
            .count();
        Ok(correct as u32)
    }
}
