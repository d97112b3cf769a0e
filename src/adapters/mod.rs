//! Concrete collaborators for the port traits.

pub mod broker_execution;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod paper_broker;
pub mod replay_market_data;
pub mod sim_execution;
