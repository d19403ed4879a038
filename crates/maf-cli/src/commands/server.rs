//! `maf server` — run the server core.

use std::path::Path;

use anyhow::Context;
use maf_server::Server;

use crate::ServerRunArgs;
use crate::logging;

pub fn run(config_file: Option<&Path>, args: &ServerRunArgs) -> anyhow::Result<()> {
    let mut cfg = super::load_config(config_file)?;
    args.apply(&mut cfg);
    maf_config::validate::run(&cfg).context("invalid configuration")?;

    logging::init(&cfg.server.log);

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(async {
        let server = Server::init(&cfg.server);
        server.run().await
    })
}
