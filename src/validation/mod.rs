//! Validation Engine
//!
//! The algorithms the checks are built from:
//! - [`escape`]: unit-name path escaping
//! - [`volume`]: escaped mount path length check
//! - [`datastore`]: datastore name check with per-run memoization
//! - [`placement`]: storage policy to compatible datastore resolution

pub mod datastore;
pub mod escape;
pub mod placement;
pub mod volume;

pub use datastore::*;
pub use escape::*;
pub use placement::*;
pub use volume::*;
