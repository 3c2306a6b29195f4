//! Command implementations
//!
//! Each submodule handles one subcommand; [`output`] holds the shared
//! rendering helpers.

pub(crate) mod agent;
pub(crate) mod config;
pub(crate) mod implement;
pub(crate) mod output;
pub(crate) mod status;
pub(crate) mod verify;
