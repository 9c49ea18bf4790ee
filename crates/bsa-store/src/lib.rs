//! BSA Store - shared mutable structures
//!
//! The proposal queue and the version store are the only shared mutable
//! state in the service. Both guard their mutating operations internally;
//! readers receive `Arc` clones so a commit is never more than a pointer
//! swap from a reader's perspective.

pub mod queue;
pub mod store;

pub use queue::*;
pub use store::*;
