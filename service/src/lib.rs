//! Infrastructure shared by every layer: command line / environment configuration
//! and logger setup.

pub mod config;
pub mod logging;
