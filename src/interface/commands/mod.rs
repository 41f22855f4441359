//! # Command Handlers
//!
//! Contains specific handler functions for each supported command (`!postman`, `!help`, `!status`).
//! These handlers are invoked by the Router.

pub mod help;
pub mod postman;
pub mod status;
