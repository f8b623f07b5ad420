pub mod classifier;
pub mod debounce;
pub mod event;
pub mod source;

pub use classifier::ScanClassifier;
pub use debounce::{Admission, Debouncer};
pub use event::{ScanEvent, ScanKind};
