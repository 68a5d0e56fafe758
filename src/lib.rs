//! Rollkit library
//!
//! Assembles a bundler invocation from layered configuration and drives it
//! once or as a watch session.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod driver;
pub mod plugins;
pub mod reporter;
pub mod utils;

pub use cli::Cli;
pub use config::EffectiveConfig;
pub use driver::Driver;
