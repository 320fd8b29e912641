//! Contract constants shared by the block model pipeline and its hosts.

pub mod coordinate_system;
pub mod limits;
pub mod pattern;
pub mod storage_keys;
