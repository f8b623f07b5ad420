pub mod locations;
pub mod moves;
pub mod spools;
