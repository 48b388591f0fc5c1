//! BOM explosion engine.
//!
//! Pure computation over an in-memory component graph built from item states. Nothing here
//! mutates stock; callers apply the resulting requirements through the inventory ledger.

pub mod graph;

pub use graph::{BomGraph, BomNode, MaterialRequirements};
