pub mod config;
pub mod error;
pub mod types;

pub use config::SynapseConfig;
pub use error::{Result, SynapseError};
pub use types::*;
