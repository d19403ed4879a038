//! Command implementations.

pub mod agent;
pub mod check_config;
pub mod generate;
pub mod raft;
pub mod server;
pub mod version;

use std::path::Path;

use anyhow::Context;
use maf_config::{Config, Loader};

/// Load the merged configuration, with an optional explicit file.
pub fn load_config(file: Option<&Path>) -> anyhow::Result<Config> {
    let loader = match file {
        Some(path) => Loader::new().with_file(path),
        None => Loader::new(),
    };
    loader.load().context("failed to load configuration")
}
