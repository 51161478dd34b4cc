//! Domain layer - Port definitions
//!
//! This module defines the traits (ports) that adapters implement:
//! the cluster snapshot, the vSphere session and the path escaper.

pub mod ports;

pub use ports::*;
