pub mod applier;

pub use applier::{MoveApplier, MoveOutcome};
