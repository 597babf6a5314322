//! CLI and HTTP trigger surface for the e2e harness.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod server;
