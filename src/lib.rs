pub mod background;
pub mod config;
pub mod dispenser;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
pub mod tenant;
pub mod visits;
pub mod wal;
