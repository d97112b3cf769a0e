//! Port traits: the collaborators the domain drives.

pub mod broker_port;
pub mod config_port;
pub mod execution_port;
pub mod market_data_port;
