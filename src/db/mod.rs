mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{Location, MoveRecord, MoveSource, Spool, SpoolInput, WeightRecord};
pub use repositories::{
    locations::LocationSeed,
    moves::{MoveCommit, ProvisioningPolicy},
};
