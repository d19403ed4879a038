//! `maf agent` — run the local monitoring agent.

use std::path::Path;

use anyhow::Context;
use maf_agent::{Agent, AgentConfig};

use crate::logging;

pub fn run(config_file: Option<&Path>) -> anyhow::Result<()> {
    let cfg = super::load_config(config_file)?;
    maf_config::validate::run(&cfg).context("invalid configuration")?;

    logging::init(&cfg.agent.log);

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(async {
        let agent = Agent::new(AgentConfig::from_http_config(&cfg.agent.http));
        agent.run().await
    })
}
