//! Sparse Tsetlin Machine engine: per-clause ordered lists of included
//! automata, trainable, with growth/pruning under a sparsity threshold.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::arith::{sat_dec_i8, sat_grow_weight, sat_inc_i8, sat_shrink_weight};
use crate::clause::{literal_correct, sparse_clause_output, sum_votes};
use crate::codec;
use crate::error::Result;
use crate::params::Params;
use crate::prng::Prng;
use crate::strategy::{
    default_feedback_selection, default_output_activation, update_probabilities, FeedbackSelection,
    OutputActivation,
};
use crate::util::try_vec;

/// Trainable sparse Tsetlin Machine: only automata with counter `>=
/// sparse_min_state` are materialized, as a sorted `(ta_id, ta_state)`
/// list per clause.
#[derive(Debug)]
pub struct SparseEngine {
    params: Params,
    rng: Prng,
    clauses: Vec<Vec<(u32, i8)>>,
    /// `[num_clauses * num_classes]`, flat.
    weights: Vec<i16>,
    /// One bit per `(class, literal)`, row stride `ceil(L/8)` bytes.
    active_literals: Vec<u8>,
    clause_outputs: Vec<bool>,
    votes: Vec<i32>,
    output_activation: OutputActivation,
    feedback_selection: FeedbackSelection,
}

impl SparseEngine {
    /// All clauses start empty; weights start at `±1` by fair coin; the
    /// active-literals bitmap starts zeroed.
    pub fn create(params: Params, seed: u32) -> Result<Self> {
        let k = params.num_clauses();
        let c = params.num_classes();

        let mut rng = Prng::new(seed);
        let mut weights = try_vec(k * c, 0i16)?;
        for w in weights.iter_mut() {
            *w = if rng.next_f32() < 0.5 { 1 } else { -1 };
        }
        let active_literals = try_vec(c * params.active_row_stride, 0u8)?;

        log::info!("created sparse engine: {} clauses, {} classes", k, c);

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            feedback_selection: default_feedback_selection(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            clauses: vec![Vec::new(); k],
            weights,
            active_literals,
            params,
            rng,
        })
    }

    /// Reads a native sparse model file written by [`SparseEngine::save`].
    pub fn load(path: impl AsRef<Path>, y_size: u32, y_element_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let params = codec::read_header(&mut r, y_size, y_element_size)?;
        let weights = codec::read_weights(&mut r, params.num_clauses() * params.num_classes())?;
        let l2 = params.num_ta();
        let clauses: Vec<Vec<(u32, i8)>> = (0..params.num_clauses())
            .map(|ci| {
                let nodes = codec::read_sparse_segment(&mut r)?;
                codec::validate_record_count(nodes.iter().map(|&(id, _)| id), l2, ci)?;
                Ok(nodes)
            })
            .collect::<Result<_>>()?;

        let k = params.num_clauses();
        let c = params.num_classes();
        let active_literals = try_vec(c * params.active_row_stride, 0u8)?;

        log::info!("loaded sparse engine from disk: {} clauses, {} classes", k, c);

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            feedback_selection: default_feedback_selection(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            clauses,
            weights,
            active_literals,
            params,
            rng: Prng::new(1),
        })
    }

    /// Reads a dense model file and converts it: each clause gets a node
    /// for every position whose dense counter is included, preserving the
    /// original counter value. The active-literals bitmap starts zeroed,
    /// since cross-loading carries no sparse-specific training history.
    pub fn load_dense(path: impl AsRef<Path>, y_size: u32, y_element_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let params = codec::read_header(&mut r, y_size, y_element_size)?;
        let weights = codec::read_weights(&mut r, params.num_clauses() * params.num_classes())?;
        let ta_state = codec::read_ta_state(&mut r, params.num_clauses() * params.num_ta())?;

        let l2 = params.num_ta();
        let clauses: Vec<Vec<(u32, i8)>> = (0..params.num_clauses())
            .map(|ci| codec::dense_clause_to_sparse(&ta_state[ci * l2..(ci + 1) * l2], params.mid_state))
            .collect();

        let k = params.num_clauses();
        let c = params.num_classes();
        let active_literals = try_vec(c * params.active_row_stride, 0u8)?;

        log::info!("loaded sparse engine from dense file: {} clauses, {} classes", k, c);

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            feedback_selection: default_feedback_selection(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            clauses,
            weights,
            active_literals,
            params,
            rng: Prng::new(1),
        })
    }

    /// Writes the sparse binary layout: shared header, weights, then each
    /// clause's `(ta_id, ta_state)` segment terminated by the sentinel.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        codec::write_header(&mut w, &self.params)?;
        codec::write_weights(&mut w, &self.weights)?;
        for clause in &self.clauses {
            codec::write_sparse_segment(&mut w, clause)?;
        }
        w.flush()?;
        log::info!("saved sparse engine to disk");
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

    pub fn clauses(&self) -> &[Vec<(u32, i8)>] {
        &self.clauses
    }

    pub fn weights(&self) -> &[i16] {
        &self.weights
    }

    pub fn clause_outputs(&self) -> &[bool] {
        &self.clause_outputs
    }

    fn active_bit(active: &[u8], class_base: usize, lit: usize) -> bool {
        (active[class_base + lit / 8] >> (lit % 8)) & 1 != 0
    }

    fn set_active_bit(active: &mut [u8], class_base: usize, lit: usize) {
        active[class_base + lit / 8] |= 1 << (lit % 8);
    }

    fn eval_clauses(&mut self, x_row: &[u8], skip_empty: bool) {
        let mid_state = self.params.mid_state;
        for (ci, out) in self.clause_outputs.iter_mut().enumerate() {
            let nodes = self.clauses[ci].iter().copied();
            *out = sparse_clause_output(nodes, mid_state, x_row, skip_empty);
        }
    }

    /// Type I-a: walks the clause's list in lockstep with `i = 0..2L`.
    /// Present automata reward/punish exactly as dense, removing a node
    /// whose counter falls below `sparse_min_state`. Absent automata never
    /// grow here; a positive-literal absent automaton that currently
    /// matches the row instead marks its literal active for this class.
    fn type_1a(&mut self, ci: usize, class: usize, w_idx: usize, x_row: &[u8]) {
        self.weights[w_idx] = sat_grow_weight(self.weights[w_idx]);

        let l2 = self.params.num_ta();
        let max_s = self.params.hyper.max_state;
        let min_s = self.params.hyper.min_state;
        let sparse_min = self.params.sparse_min_state;
        let boost = self.params.hyper.boost_true_positive_feedback;
        let s_m1_inv = self.params.s_m1_inv;
        let s_inv = self.params.s_inv;
        let row_stride = self.params.active_row_stride;
        let class_base = class * row_stride;

        let old = std::mem::take(&mut self.clauses[ci]);
        let mut new_nodes = Vec::with_capacity(old.len());
        let mut cursor = 0usize;

        for i in 0..l2 as u32 {
            let present = cursor < old.len() && old[cursor].0 == i;
            if present {
                let (_, state) = old[cursor];
                cursor += 1;
                let correct = literal_correct(x_row, i);
                if correct {
                    if boost || self.rng.next_f32() < s_m1_inv {
                        new_nodes.push((i, sat_inc_i8(state, max_s)));
                    } else {
                        new_nodes.push((i, state));
                    }
                } else if self.rng.next_f32() < s_inv {
                    let shrunk = sat_dec_i8(state, min_s);
                    if shrunk >= sparse_min {
                        new_nodes.push((i, shrunk));
                    }
                } else {
                    new_nodes.push((i, state));
                }
            } else if i & 1 == 0 {
                let lit = (i >> 1) as usize;
                if x_row[lit] == 1 && !Self::active_bit(&self.active_literals, class_base, lit) {
                    Self::set_active_bit(&mut self.active_literals, class_base, lit);
                }
            }
        }

        self.clauses[ci] = new_nodes;
    }

    /// Type I-b: present automata weaken with probability `s_inv`,
    /// removed if they fall below `sparse_min_state`; absent automata are
    /// untouched.
    fn type_1b(&mut self, ci: usize) {
        let min_s = self.params.hyper.min_state;
        let sparse_min = self.params.sparse_min_state;
        let s_inv = self.params.s_inv;

        let old = std::mem::take(&mut self.clauses[ci]);
        let mut new_nodes = Vec::with_capacity(old.len());
        for (id, state) in old {
            if self.rng.next_f32() < s_inv {
                let shrunk = sat_dec_i8(state, min_s);
                if shrunk >= sparse_min {
                    new_nodes.push((id, shrunk));
                }
            } else {
                new_nodes.push((id, state));
            }
        }
        self.clauses[ci] = new_nodes;
    }

    /// Type II: present automata that are excluded and whose inclusion
    /// would deactivate the clause grow deterministically, as dense.
    /// Absent automata grow a new node at `sparse_init_state` exactly when
    /// that same deactivate condition holds, gated by the active-literals
    /// bit for positive literals, which never build one otherwise.
    fn type_2(&mut self, ci: usize, class: usize, w_idx: usize, x_row: &[u8]) {
        self.weights[w_idx] = sat_shrink_weight(self.weights[w_idx]);

        let l2 = self.params.num_ta();
        let max_s = self.params.hyper.max_state;
        let sparse_init = self.params.sparse_init_state;
        let row_stride = self.params.active_row_stride;
        let class_base = class * row_stride;

        let old = std::mem::take(&mut self.clauses[ci]);
        let mut new_nodes = Vec::with_capacity(old.len() + 1);
        let mut cursor = 0usize;

        for i in 0..l2 as u32 {
            let present = cursor < old.len() && old[cursor].0 == i;
            let correct = literal_correct(x_row, i);
            if present {
                let (_, state) = old[cursor];
                cursor += 1;
                if !correct {
                    new_nodes.push((i, sat_inc_i8(state, max_s)));
                } else {
                    new_nodes.push((i, state));
                }
            } else {
                let lit = (i >> 1) as usize;
                let insert = if i & 1 == 0 {
                    !correct && Self::active_bit(&self.active_literals, class_base, lit)
                } else {
                    !correct
                };
                if insert {
                    new_nodes.push((i, sparse_init));
                }
            }
        }

        self.clauses[ci] = new_nodes;
    }

    fn apply_feedback(&mut self, ci: usize, class: usize, is_positive: bool, x_row: &[u8]) {
        let c = self.params.num_classes();
        let w_idx = ci * c + class;
        let out = self.clause_outputs[ci];
        let w_is_positive = self.weights[w_idx] >= 0;

        if w_is_positive == is_positive {
            if out {
                self.type_1a(ci, class, w_idx, x_row);
            } else {
                self.type_1b(ci);
            }
        } else if out {
            self.type_2(ci, class, w_idx, x_row);
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

    pub fn train(&mut self, x: &[u8], y: &[u8], rows: usize, epochs: usize) -> Result<()> {
        let l = self.params.num_literals();
        let y_stride = (self.params.hyper.y_size * self.params.hyper.y_element_size) as usize;

        log::info!("training sparse engine: {rows} rows x {epochs} epochs");
        for epoch in 0..epochs {
            for r in 0..rows {
                let x_row = &x[r * l..(r + 1) * l];
                let y_row = &y[r * y_stride..(r + 1) * y_stride];
                self.train_row(x_row, y_row)?;
            }
            log::debug!("sparse engine completed epoch {epoch}");
        }
        Ok(())
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Hyperparams;

    fn params() -> Params {
        Params::new(Hyperparams {
            num_classes: 2,
            threshold: 10,
            num_literals: 6,
            num_clauses: 3,
            max_state: 127,
            min_state: -127,
            boost_true_positive_feedback: false,
            s: 3.0,
            y_size: 1,
            y_element_size: 4,
        })
        .unwrap()
    }

    #[test]
    fn clauses_start_empty() {
        let engine = SparseEngine::create(params(), 1).unwrap();
        assert!(engine.clauses.iter().all(Vec::is_empty));
    }

    #[test]
    fn clause_output_skips_nodes_below_mid_state() {
        let mut engine = SparseEngine::create(params(), 1).unwrap();
        // id0 = lit0 positive, included (state 50 >= mid 0).
        // id2 = lit1 positive, excluded (state -50 < mid 0) and must not be
        // required to vote correctly, matching dense's inclusion test.
        engine.clauses[0] = vec![(0, 50), (2, -50)];

        let x_row = [1u8, 0, 1, 0, 1, 0];
        engine.eval_clauses(&x_row, true);
        assert!(
            engine.clause_outputs[0],
            "excluded node must not be treated as included"
        );
    }

    #[test]
    fn clause_with_only_excluded_nodes_is_empty() {
        let mut engine = SparseEngine::create(params(), 1).unwrap();
        engine.clauses[0] = vec![(0, -50), (2, -50)];

        let x_row = [1u8, 0, 1, 0, 1, 0];
        engine.eval_clauses(&x_row, true);
        assert!(!engine.clause_outputs[0], "all-excluded clause must read as empty");

        engine.eval_clauses(&x_row, false);
        assert!(engine.clause_outputs[0], "skip_empty=false must still fire an empty clause");
    }

    #[test]
    fn nodes_stay_strictly_increasing_and_never_below_sparse_min() {
        let mut engine = SparseEngine::create(params(), 7).unwrap();
        let rows: Vec<[u8; 6]> = (0..40u32)
            .map(|n| {
                let mut r = [0u8; 6];
                for (i, slot) in r.iter_mut().enumerate() {
                    *slot = ((n >> i) & 1) as u8;
                }
                r
            })
            .collect();
        let x: Vec<u8> = rows.iter().flatten().copied().collect();
        let y: Vec<u8> = (0..40u32).flat_map(|n| (n % 2).to_le_bytes()).collect();
        engine.train(&x, &y, 40, 5).unwrap();

        for clause in &engine.clauses {
            let mut prev: Option<u32> = None;
            for &(id, state) in clause {
                if let Some(p) = prev {
                    assert!(id > p, "sparse ids must be strictly increasing");
                }
                prev = Some(id);
                assert!(state >= engine.params.sparse_min_state);
            }
        }
    }
}
