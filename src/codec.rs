//! Binary model codec.
//!
//! Dense models are a fixed-size flat layout; sparse and stateless models
//! share a header and weights block with the dense format, followed by
//! per-clause variable-length segments terminated by a sentinel. Every
//! integer is little-endian, with no padding, matching spec's wire layout.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::{EngineError, Result};
use crate::params::{Hyperparams, Params};

const SENTINEL: u32 = 0xFFFF_FFFF;

/// Writes the shared dense/sparse/stateless header.
pub fn write_header<W: Write>(w: &mut W, params: &Params) -> Result<()> {
    let h = &params.hyper;
    w.write_u32::<LE>(h.threshold as u32)?;
    w.write_u32::<LE>(h.num_literals)?;
    w.write_u32::<LE>(h.num_clauses)?;
    w.write_u32::<LE>(h.num_classes)?;
    w.write_i8(h.max_state)?;
    w.write_i8(h.min_state)?;
    w.write_u8(h.boost_true_positive_feedback as u8)?;
    w.write_f64::<LE>(h.s)?;
    Ok(())
}

/// Reads the shared header and combines it with the caller-supplied label
/// shape (not itself persisted) into validated `Params`.
pub fn read_header<R: Read>(r: &mut R, y_size: u32, y_element_size: u32) -> Result<Params> {
    let threshold = r.read_u32::<LE>()? as i32;
    let num_literals = r.read_u32::<LE>()?;
    let num_clauses = r.read_u32::<LE>()?;
    let num_classes = r.read_u32::<LE>()?;
    let max_state = r.read_i8()?;
    let min_state = r.read_i8()?;
    let boost_true_positive_feedback = r.read_u8()? != 0;
    let s = r.read_f64::<LE>()?;

    Params::new(Hyperparams {
        num_classes,
        threshold,
        num_literals,
        num_clauses,
        max_state,
        min_state,
        boost_true_positive_feedback,
        s,
        y_size,
        y_element_size,
    })
}

/// Writes the `[num_clauses * num_classes]` weights block.
pub fn write_weights<W: Write>(w: &mut W, weights: &[i16]) -> Result<()> {
    for &v in weights {
        w.write_i16::<LE>(v)?;
    }
    Ok(())
}

pub fn read_weights<R: Read>(r: &mut R, len: usize) -> Result<Vec<i16>> {
    let mut weights = Vec::new();
    weights.try_reserve_exact(len).map_err(|_| EngineError::Alloc)?;
    for _ in 0..len {
        weights.push(r.read_i16::<LE>()?);
    }
    Ok(weights)
}

/// Writes the flat `[num_clauses * num_literals * 2]` dense counter array.
pub fn write_ta_state<W: Write>(w: &mut W, ta_state: &[i8]) -> Result<()> {
    for &v in ta_state {
        w.write_i8(v)?;
    }
    Ok(())
}

pub fn read_ta_state<R: Read>(r: &mut R, len: usize) -> Result<Vec<i8>> {
    let mut ta_state = Vec::new();
    ta_state.try_reserve_exact(len).map_err(|_| EngineError::Alloc)?;
    for _ in 0..len {
        ta_state.push(r.read_i8()?);
    }
    Ok(ta_state)
}

/// Writes one clause's sorted `(ta_id, ta_state)` sparse segment, terminated
/// by the sentinel.
pub fn write_sparse_segment<W: Write>(w: &mut W, nodes: &[(u32, i8)]) -> Result<()> {
    for &(id, state) in nodes {
        w.write_u32::<LE>(id)?;
        w.write_i8(state)?;
    }
    w.write_u32::<LE>(SENTINEL)?;
    Ok(())
}

pub fn read_sparse_segment<R: Read>(r: &mut R) -> Result<Vec<(u32, i8)>> {
    let mut nodes = Vec::new();
    loop {
        let id = r.read_u32::<LE>()?;
        if id == SENTINEL {
            return Ok(nodes);
        }
        let state = r.read_i8()?;
        nodes.push((id, state));
    }
}

/// Writes one clause's sorted `ta_id` stateless segment, terminated by the
/// sentinel.
pub fn write_stateless_segment<W: Write>(w: &mut W, ids: &[u32]) -> Result<()> {
    for &id in ids {
        w.write_u32::<LE>(id)?;
    }
    w.write_u32::<LE>(SENTINEL)?;
    Ok(())
}

pub fn read_stateless_segment<R: Read>(r: &mut R) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    loop {
        let id = r.read_u32::<LE>()?;
        if id == SENTINEL {
            return Ok(ids);
        }
        ids.push(id);
    }
}

/// Checks that a loaded clause's `ta_id`s are strictly increasing and each
/// one addresses a real automaton position, rejecting a file whose segment
/// was corrupted or truncated at the wrong offset.
pub fn validate_record_count(ids: impl Iterator<Item = u32>, num_ta: usize, clause: usize) -> Result<()> {
    let mut prev: Option<u32> = None;
    for id in ids {
        if id as usize >= num_ta {
            return Err(EngineError::UnexpectedRecordCount { clause });
        }
        if let Some(p) = prev {
            if id <= p {
                return Err(EngineError::UnexpectedRecordCount { clause });
            }
        }
        prev = Some(id);
    }
    Ok(())
}

/// Converts a dense clause's counters into the sparse representation: a
/// node for every position whose counter is included, preserving its value.
pub fn dense_clause_to_sparse(ta_state: &[i8], mid_state: i8) -> Vec<(u32, i8)> {
    ta_state
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s >= mid_state)
        .map(|(i, &s)| (i as u32, s))
        .collect()
}

/// Converts a dense clause's counters into the stateless representation: a
/// bare id for every included position, discarding the counter value.
pub fn dense_clause_to_stateless(ta_state: &[i8], mid_state: i8) -> Vec<u32> {
    ta_state
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s >= mid_state)
        .map(|(i, _)| i as u32)
        .collect()
}
