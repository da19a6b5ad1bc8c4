//! Library side of the `sih` command-line driver.

pub mod config;
pub mod logging;
pub mod pipeline;
