//! Fallible buffer allocation.
//!
//! Every engine acquires its scratch memory through these helpers before it
//! touches a caller-owned buffer, so an exhausted allocator surfaces as
//! [`Error::AllocationFailed`] and leaves outputs unmodified.

use crate::{Error, Result};

/// Allocate a vector of `len` copies of `value`, reporting allocator failure as an error.
pub fn try_alloc<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::AllocationFailed {
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Fallible equivalent of `slice.to_vec()`.
pub fn try_clone_slice<T: Clone>(src: &[T]) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len()).map_err(|_| Error::AllocationFailed {
        bytes: std::mem::size_of_val(src),
    })?;
    buf.extend_from_slice(src);
    Ok(buf)
}
