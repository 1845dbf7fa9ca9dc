//! Front-ends for the plughost runtime: the HTTP server, the CLI, logging
//! setup, and the plugins this build ships with.

pub mod api;
pub mod cli;
pub mod logging;
pub mod plugins;
