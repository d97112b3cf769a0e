//! sigtrader: a multi-instrument signal engine for backtesting and paper
//! trading.
//!
//! Hexagonal architecture: decision logic in [`domain`], collaborator traits
//! in [`ports`], concrete collaborators in [`adapters`], and the command line
//! front end in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
