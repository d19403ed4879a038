//! `maf check-config` — validate the merged configuration.

use std::path::Path;

pub fn run(config_file: Option<&Path>) -> anyhow::Result<()> {
    let cfg = super::load_config(config_file)?;
    maf_config::validate::run(&cfg)?;
    println!("Config OK");
    Ok(())
}
