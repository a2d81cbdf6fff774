//! Ready-to-use event classifiers.

mod structural;

pub use structural::{StructuralClassifier, StructuralConfig};
