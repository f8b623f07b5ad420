pub mod location;
pub mod move_record;
pub mod spool;
pub mod weight_record;

pub use location::Location;
pub use move_record::{MoveRecord, MoveSource};
pub use spool::{guess_spool_name, Spool, SpoolInput};
pub use weight_record::WeightRecord;
