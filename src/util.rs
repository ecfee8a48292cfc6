//! Small shared allocation helper so construction paths report `Alloc`
//! instead of aborting when a large buffer cannot be reserved.

use crate::error::{EngineError, Result};

pub(crate) fn try_vec<T: Clone>(len: usize, fill: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| EngineError::Alloc)?;
    v.resize(len, fill);
    Ok(v)
}
