//! Device state stores
//!
//! State is written only from the connection's dispatcher task; every other
//! caller reads through snapshots or accessors.

pub mod mapping;
pub mod matrix;
pub mod switcher;

pub use mapping::{MappingTable, MappingType, OutputTie};
pub use matrix::{LockMode, MatrixState, Topology};
pub use switcher::{SwitcherSnapshot, SwitcherState, VideoType};
