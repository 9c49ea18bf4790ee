//! BSA Reconciler - merges pending proposals into new canonical versions
//!
//! The reconciliation cycle:
//! 1. Drain the proposal queue (atomic, FIFO)
//! 2. Apply final proposals in order against the head (best-effort batch)
//! 3. Commit the combined result as a new version (one bounded retry)
//! 4. Apply provisional proposals into the advisory overlay
//!
//! The loop is the only writer to the version store.

pub mod overlay;
pub mod reconciler;

pub use overlay::*;
pub use reconciler::*;
