pub mod air_exchange;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod overrides;
pub mod paths;
pub mod policy;
pub mod stage;
pub mod state;
pub mod types;
pub mod vpd;

pub use error::{Result, VpdError};
