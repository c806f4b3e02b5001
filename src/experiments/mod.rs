//! Experiment evaluation: variant-set strategies, targeting predicate trees, and the
//! per-experiment decision algorithm.
mod eval;
mod targeting;
mod variants;

pub use eval::{SimpleExperiment, NUM_BUCKETS};
pub use targeting::Targeting;
pub use variants::{Variant, VariantSet};
