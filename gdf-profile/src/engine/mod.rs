//! Pure reconciliation stages
//!
//! Each stage takes the current record and the clock and reports whether it
//! changed anything. None of them perform I/O; the reconciliation driver
//! chains them and decides whether to write.

pub mod entitlements;
pub mod evaluator;
pub mod normalizer;
pub mod tasks;

pub use entitlements::recalculate;
pub use evaluator::{evaluate, Evaluation, EvaluationContext, PassKind};
pub use normalizer::{normalize, Normalized};
pub use tasks::{ClaimOutcome, TaskContent};
