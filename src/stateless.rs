//! Stateless Tsetlin Machine engine: inference only, built solely by
//! cross-loading a dense model file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::clause::{listed_clause_output, sum_votes};
use crate::codec;
use crate::error::Result;
use crate::params::Params;
use crate::strategy::{default_output_activation, OutputActivation};
use crate::util::try_vec;

/// Inference-only Tsetlin Machine: each clause keeps only the sorted list
/// of included `ta_id`s, discarding every counter. No training support.
#[derive(Debug)]
pub struct StatelessEngine {
    params: Params,
    clauses: Vec<Vec<u32>>,
    /// `[num_clauses * num_classes]`, flat.
    weights: Vec<i16>,
    clause_outputs: Vec<bool>,
    votes: Vec<i32>,
    output_activation: OutputActivation,
}

impl StatelessEngine {
    /// Reads a native stateless model file written by
    /// [`StatelessEngine::save`].
    pub fn load(path: impl AsRef<Path>, y_size: u32, y_element_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let params = codec::read_header(&mut r, y_size, y_element_size)?;
        let weights = codec::read_weights(&mut r, params.num_clauses() * params.num_classes())?;
        let l2 = params.num_ta();
        let clauses: Vec<Vec<u32>> = (0..params.num_clauses())
            .map(|ci| {
                let ids = codec::read_stateless_segment(&mut r)?;
                codec::validate_record_count(ids.iter().copied(), l2, ci)?;
                Ok(ids)
            })
            .collect::<Result<_>>()?;

        let k = params.num_clauses();
        let c = params.num_classes();
        log::info!("loaded stateless engine from disk: {} clauses, {} classes", k, c);

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            clauses,
            weights,
            params,
        })
    }

    /// Reads a dense model file and keeps, per clause, only the bare ids
    /// of positions whose counter is included, discarding the counter value
    /// itself.
    pub fn load_dense(path: impl AsRef<Path>, y_size: u32, y_element_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let params = codec::read_header(&mut r, y_size, y_element_size)?;
        let weights = codec::read_weights(&mut r, params.num_clauses() * params.num_classes())?;
        let ta_state = codec::read_ta_state(&mut r, params.num_clauses() * params.num_ta())?;

        let l2 = params.num_ta();
        let clauses: Vec<Vec<u32>> = (0..params.num_clauses())
            .map(|ci| codec::dense_clause_to_stateless(&ta_state[ci * l2..(ci + 1) * l2], params.mid_state))
            .collect();

        let k = params.num_clauses();
        let c = params.num_classes();
        log::info!(
            "loaded stateless engine from dense file: {} clauses, {} classes",
            k,
            c
        );

        Ok(Self {
            output_activation: default_output_activation(&params.hyper),
            clause_outputs: vec![false; k],
            votes: vec![0; c],
            clauses,
            weights,
            params,
        })
    }

    /// Writes the stateless binary layout: shared header, weights, then
    /// each clause's bare-id segment terminated by the sentinel.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        codec::write_header(&mut w, &self.params)?;
        codec::write_weights(&mut w, &self.weights)?;
        for clause in &self.clauses {
            codec::write_stateless_segment(&mut w, clause)?;
        }
        w.flush()?;
        log::info!("saved stateless engine to disk");
        Ok(())
    }

    pub fn set_output_activation(&mut self, activation: OutputActivation) {
        self.output_activation = activation;
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn clauses(&self) -> &[Vec<u32>] {
        &self.clauses
    }

    pub fn weights(&self) -> &[i16] {
        &self.weights
    }

    pub fn clause_outputs(&self) -> &[bool] {
        &self.clause_outputs
    }

    fn eval_clauses(&mut self, x_row: &[u8]) {
        for (ci, out) in self.clause_outputs.iter_mut().enumerate() {
            *out = listed_clause_output(self.clauses[ci].iter().copied(), x_row, true);
        }
    }

    pub fn predict(&mut self, x: &[u8], y_pred: &mut [u8], rows: usize) -> Result<()> {
        let l = self.params.num_literals();
        let y_stride = (self.params.hyper.y_size * self.params.hyper.y_element_size) as usize;

        for r in 0..rows {
            let x_row = &x[r * l..(r + 1) * l];
            self.eval_clauses(x_row);
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
    use crate::dense::DenseEngine;
    use crate::params::Hyperparams;
    use tempfile_like_helper::TempPath;

    mod tempfile_like_helper {
        use std::path::{Path, PathBuf};

        /// Minimal scratch-file helper so tests don't depend on the
        /// `tempfile` crate for a single throwaway path per test.
        pub struct TempPath(PathBuf);

        impl TempPath {
            pub fn new(name: &str) -> Self {
                let mut p = std::env::temp_dir();
                p.push(format!("tsetlin-engine-test-{name}-{}", std::process::id()));
                Self(p)
            }
        }

        impl AsRef<Path> for TempPath {
            fn as_ref(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    fn params() -> Params {
        Params::new(Hyperparams {
            num_classes: 1,
            threshold: 10,
            num_literals: 3,
            num_clauses: 1,
            max_state: 127,
            min_state: -127,
            boost_true_positive_feedback: false,
            s: 10.0,
            y_size: 1,
            y_element_size: 1,
        })
        .unwrap()
    }

    #[test]
    fn stateless_predictions_match_dense_after_cross_load() {
        let path = TempPath::new("stateless-cross-load");
        let mut dense = DenseEngine::create(params(), 1).unwrap();
        dense.train(&[1, 0, 1, 0, 1, 0], &[0, 1], 2, 20).unwrap();
        dense.save(&path).unwrap();

        let mut stateless = StatelessEngine::load_dense(&path, 1, 1).unwrap();
        stateless.set_output_activation(crate::strategy::OutputActivation::BinaryVector);

        let mut dense_for_predict = DenseEngine::load(&path, 1, 1).unwrap();
        dense_for_predict.set_output_activation(crate::strategy::OutputActivation::BinaryVector);

        let rows = [[1u8, 0, 1], [0, 1, 0], [1, 1, 1]];
        for row in rows {
            let mut y_dense = [0u8];
            let mut y_stateless = [0u8];
            dense_for_predict.predict(&row, &mut y_dense, 1).unwrap();
            stateless.predict(&row, &mut y_stateless, 1).unwrap();
            assert_eq!(y_dense, y_stateless);
        }
    }
}
