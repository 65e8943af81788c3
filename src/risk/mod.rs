pub mod projector;

pub use projector::*;
