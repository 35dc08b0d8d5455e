//! Learned-policy lookup: a precomputed state → action-value table, a
//! nearest-neighbor index over its keys, and rule synthesis for states the
//! table knows nothing about.

pub mod fallback;
pub mod kdtree;
pub mod table;

pub use fallback::{best_action, DecisionSource, PolicyDecision, SynthesisContext};
pub use kdtree::KdTree;
pub use table::{PolicyEntry, PolicyTable, PolicyTableFile, StateKey, TABLE_VERSION};
