//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod action;
pub(crate) mod completions;
pub(crate) mod maintenance;
pub(crate) mod modules;
pub(crate) mod ports;
pub(crate) mod status;
pub(crate) mod watch;
