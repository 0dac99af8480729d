//! Sorted interval maps over `u64` address spaces.
//!
//! Four flavors, matching the four ways the rest of the crate needs to ask
//! "what covers this address": [`Simple`] (membership only), [`WithData`]
//! (membership plus an arbitrary fused-on-equality payload, used for the
//! permission map), [`WithOffset`] (membership plus a linearly-translated
//! offset, used for p2o/o2p/v2o), and [`Overlapping`] (one offset may answer
//! to many addresses at once, used for o2v).
//!
//! All are built once from a list of intervals and never mutated afterward.

mod offset;
mod overlapping;
mod simple;
mod with_data;

pub use offset::WithOffset;
pub use overlapping::Overlapping;
pub use simple::Simple;
pub use with_data::WithData;

/// Index of the greatest element of `keys` that is `<= x`, or `None` if `x`
/// is smaller than every key. `keys` must be sorted and duplicate-free.
pub(crate) fn floor_index(keys: &[u64], x: u64) -> Option<usize> {
    match keys.binary_search(&x) {
        Ok(i) => Some(i),
        Err(0) => None,
        Err(i) => Some(i - 1),
    }
}
