//! Command-line front end for shellbus.
//!
//! - `replay`: feed a captured message script through an in-process bus
//! - `serve`: run the bus against an engine speaking framed JSON on stdio
//! - `states`: print the launch-state graph

pub mod cli;
pub mod commands;
pub mod logging;
