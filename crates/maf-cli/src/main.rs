//! maf — MySQL auto-failover coordination service.
//!
//! # Quick start
//!
//! ```bash
//! # Bootstrap a single-node devmode cluster
//! maf server --node-id node-1 --bootstrap --devmode \
//!     --peers http://127.0.0.1:7080
//!
//! # Inspect the cluster
//! maf server raft info --include-stats
//!
//! # Use the replicated key-value store
//! maf server raft kv set mykey myvalue
//! maf server raft kv get mykey
//! ```

mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, CommandFactory, Parser, Subcommand};

/// MySQL auto-failover coordination service.
#[derive(Parser)]
#[command(name = "maf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the config file (default: ~/.maf.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a maf server.
    ///
    /// The server communicates with the agents and performs failover if
    /// needed. It is designed to run on a separate host.
    Server(ServerArgs),

    /// Run a maf agent next to a monitored MySQL instance.
    Agent,

    /// Load and validate the merged configuration.
    CheckConfig,

    /// Generate documentation.
    #[command(subcommand)]
    Gen(GenCommands),

    /// Show version information.
    Version,
}

#[derive(Args)]
struct ServerArgs {
    #[command(subcommand)]
    command: Option<ServerCommands>,

    #[command(flatten)]
    run: ServerRunArgs,
}

/// CLI overrides for `server.*` configuration keys; each flag maps to
/// exactly one canonical key.
#[derive(Args, Default)]
struct ServerRunArgs {
    /// Address to listen to (server.http.addr).
    #[arg(long)]
    addr: Option<String>,

    /// Advertised HTTP URL (server.http.advertise).
    #[arg(long)]
    advertise: Option<String>,

    /// Path to the cert file (server.http.cert_file).
    #[arg(long, requires = "key_file")]
    cert_file: Option<String>,

    /// Path to the key file (server.http.key_file).
    #[arg(long, requires = "cert_file")]
    key_file: Option<String>,

    /// Path to the client CA file for mTLS (server.http.client_cert_file).
    #[arg(long)]
    client_cert_file: Option<String>,

    /// Raft transport address (server.raft.addr).
    #[arg(long)]
    raft_addr: Option<String>,

    /// Unique node id (server.raft.node_id).
    #[arg(long)]
    node_id: Option<String>,

    /// Raft data directory (server.raft.data_dir).
    #[arg(long)]
    data_dir: Option<String>,

    /// Use in-memory stores (server.raft.devmode).
    #[arg(long)]
    devmode: bool,

    /// Peer HTTP advertise URLs (server.raft.peers).
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Bootstrap a new cluster (server.raft.bootstrap).
    #[arg(long)]
    bootstrap: bool,

    /// Log level (server.log.level).
    #[arg(long)]
    log_level: Option<String>,

    /// Human-readable log output (server.log.pretty).
    #[arg(long)]
    log_pretty: bool,
}

impl ServerRunArgs {
    fn apply(&self, cfg: &mut maf_config::Config) {
        let server = &mut cfg.server;

        if let Some(addr) = &self.addr {
            server.http.addr = addr.clone();
        }
        if let Some(advertise) = &self.advertise {
            server.http.advertise = advertise.clone();
        }
        if self.cert_file.is_some() {
            server.http.cert_file = self.cert_file.clone();
        }
        if self.key_file.is_some() {
            server.http.key_file = self.key_file.clone();
        }
        if self.client_cert_file.is_some() {
            server.http.client_cert_file = self.client_cert_file.clone();
        }
        if let Some(raft_addr) = &self.raft_addr {
            server.raft.addr = raft_addr.clone();
        }
        if self.node_id.is_some() {
            server.raft.node_id = self.node_id.clone();
        }
        if self.data_dir.is_some() {
            server.raft.data_dir = self.data_dir.clone();
        }
        if self.devmode {
            server.raft.devmode = true;
        }
        if !self.peers.is_empty() {
            server.raft.peers = self.peers.clone();
        }
        if self.bootstrap {
            server.raft.bootstrap = true;
        }
        if let Some(level) = &self.log_level {
            server.log.level = level.clone();
        }
        if self.log_pretty {
            server.log.pretty = true;
        }
    }
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Low-level Raft commands.
    ///
    /// It's highly recommended to use these commands ONLY for debugging
    /// purposes.
    #[command(subcommand)]
    Raft(RaftCommands),
}

#[derive(Subcommand)]
enum RaftCommands {
    /// Show cluster state and members.
    Info {
        /// Include opaque runtime telemetry.
        #[arg(long)]
        include_stats: bool,
    },

    /// Remove a server from the cluster.
    ///
    /// The server will be demoted and removed. Make sure you know what you
    /// are doing and will have enough servers to keep the quorum.
    Forget {
        /// Id of the server to remove.
        server_id: String,
    },

    /// Key-value store commands.
    #[command(subcommand)]
    Kv(KvCommands),
}

#[derive(Subcommand)]
enum KvCommands {
    /// Get value for key.
    Get { key: String },

    /// Set value for key.
    Set { key: String, value: String },

    /// Delete value by key.
    Delete { key: String },
}

#[derive(Subcommand)]
enum GenCommands {
    /// Write markdown documentation for every command.
    Doc {
        /// Output directory.
        #[arg(long)]
        dir: PathBuf,
    },

    /// Write man pages for every command.
    Man {
        /// Output directory.
        #[arg(long)]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Server(args) => match args.command {
            None => commands::server::run(config_file, &args.run),
            Some(ServerCommands::Raft(raft)) => commands::raft::run(config_file, &raft),
        },
        Commands::Agent => commands::agent::run(config_file),
        Commands::CheckConfig => commands::check_config::run(config_file),
        Commands::Gen(gen) => match gen {
            GenCommands::Doc { dir } => commands::generate::doc(&mut Cli::command(), &dir),
            GenCommands::Man { dir } => commands::generate::man(&Cli::command(), &dir),
        },
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
