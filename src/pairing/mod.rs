pub mod controller;
pub mod state;

pub use controller::{StationController, StationEvent};
pub use state::{CorrelationEngine, MoveIntent, PairingSnapshot};
