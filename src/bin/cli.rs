//! permgraph CLI - permission graph cache.
//!
//! Usage:
//!   permgraph serve                      # Run the daemon
//!   permgraph user <name>                # Groups and grants of a user
//!   permgraph group <name>               # Members, ancestors and grants of a group
//!   permgraph permission <name>          # Who holds a permission
//!   permgraph groups [--audited]         # List groups
//!   permgraph permissions [--audited]    # List permissions
//!   permgraph disabled-groups            # List disabled groups
//!   permgraph checkpoint                 # Served checkpoint
//!   permgraph stats                      # Snapshot sizes and refresh gauges
//!   permgraph check-config               # Validate the config file
//!
//! Queries go to a running daemon when one answers on the configured socket,
//! otherwise the dataset is loaded in-process for the one query.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use permgraph::daemon::{self, DaemonState, Request, Response};
use permgraph::refresh::{RefreshStats, SchedulerControl};
use permgraph::storage::JsonFileStorage;
use permgraph::{Config, GraphCache};

#[derive(Parser)]
#[command(name = "permgraph")]
#[command(about = "permgraph - in-memory permission graph cache", long_about = None)]
struct Cli {
    /// Config file
    #[arg(short, long, default_value = "permgraph.toml")]
    config: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Answer from a freshly loaded dataset even if a daemon is running
    #[arg(long)]
    local: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Serve,

    /// Show the groups and effective grants of a user
    User {
        name: String,

        /// Maximum traversal depth
        #[arg(long)]
        cutoff: Option<usize>,
    },

    /// Show members, ancestor groups and effective grants of a group
    Group {
        name: String,

        /// Maximum traversal depth
        #[arg(long)]
        cutoff: Option<usize>,

        /// Only report grants of this permission
        #[arg(short, long)]
        permission: Option<String>,

        /// Leave out grants produced by alias expansion
        #[arg(long)]
        hide_aliases: bool,
    },

    /// Show every group and service account holding a permission
    Permission { name: String },

    /// List enabled groups
    Groups {
        /// Groups holding or inheriting an audited grant
        #[arg(long)]
        audited: bool,

        /// Groups holding an audited grant themselves
        #[arg(long)]
        directly_audited: bool,
    },

    /// List enabled permissions
    Permissions {
        #[arg(long)]
        audited: bool,
    },

    /// List disabled groups
    DisabledGroups,

    /// List enabled users
    Users,

    /// Show the checkpoint of the served snapshot
    Checkpoint,

    /// Show snapshot sizes and refresh gauges
    Stats,

    /// Ask a running daemon to rebuild now
    Rebuild,

    /// Ask a running daemon to exit
    Shutdown,

    /// Validate the config file and exit
    CheckConfig,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "permgraph=debug" } else { "permgraph=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;

    let request = match cli.command {
        Commands::Serve => return daemon::start_daemon(&config),
        Commands::CheckConfig => {
            println!(
                "{}: ok (database {}, refresh every {}s, {} alias rules)",
                cli.config.display(),
                config.database.display(),
                config.refresh_interval_secs,
                config.aliases.len()
            );
            return Ok(());
        }
        Commands::User { name, cutoff } => Request::UserDetails { name, cutoff },
        Commands::Group {
            name,
            cutoff,
            permission,
            hide_aliases,
        } => Request::GroupDetails {
            name,
            cutoff,
            show_permission: permission,
            expose_aliases: !hide_aliases,
        },
        Commands::Permission { name } => Request::PermissionDetails { name },
        Commands::Groups {
            audited,
            directly_audited,
        } => Request::Groups {
            audited,
            directly_audited,
        },
        Commands::Permissions { audited } => Request::Permissions { audited },
        Commands::DisabledGroups => Request::DisabledGroups,
        Commands::Users => Request::Users,
        Commands::Checkpoint => Request::Checkpoint,
        Commands::Stats => Request::Stats,
        Commands::Rebuild => Request::Rebuild,
        Commands::Shutdown => Request::Shutdown,
    };

    let response = if !cli.local && daemon::is_daemon_running(&config.socket) {
        daemon::send_request(&config.socket, &request)?
    } else if matches!(request, Request::Rebuild | Request::Shutdown) {
        bail!("no daemon answering on {}", config.socket.display());
    } else {
        answer_locally(&config, request)?
    };

    print_response(response)
}

fn answer_locally(config: &Config, request: Request) -> Result<Response> {
    let storage = Arc::new(JsonFileStorage::open(&config.database));
    let cache = Arc::new(GraphCache::load(storage, Arc::new(config.alias_table()))?);
    let state = DaemonState::new(cache, Arc::new(RefreshStats::new()), SchedulerControl::detached());
    Ok(daemon::process_request(request, &state))
}

fn print_response(response: Response) -> Result<()> {
    match response {
        Response::Ok {
            checkpoint,
            checkpoint_time,
            data,
        } => {
            eprintln!("checkpoint {} @ {}", checkpoint, checkpoint_time);
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        Response::Error { message, .. } => bail!(message),
        Response::Pong => {
            println!("pong");
            Ok(())
        }
        Response::Goodbye => {
            println!("daemon shutting down");
            Ok(())
        }
    }
}
