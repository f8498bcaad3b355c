//! DVR Node binary
//!
//! Runs one distance-vector routing node over UDP.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, Command};
use dvr_node::{NodeConfig, NodeRuntime};
use dvr_protocols::{BroadcastReport, RouterConfig};
use dvr_topology::NodeId;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let matches = Command::new("dvr-node")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run one node of a distance-vector routing simulation.")
        .arg(
            Arg::new("port")
                .required(true)
                .help("UDP port this node listens on")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("id")
                .required(true)
                .help("Node identifier (A-F)")
                .value_parser(value_parser!(NodeId)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Topology file [env: DVR_CONFIG] [default: topology.config]")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .help("Heartbeat and retransmission interval [env: DVR_TIMEOUT_MS] [default: 1000]")
                .value_parser(clap::builder::RangedU64ValueParser::<u64>::new().range(1..)),
        )
        .arg(
            Arg::new("ip")
                .long("ip")
                .help("Address all nodes listen on [env: DVR_IP] [default: 127.0.0.1]")
                .value_parser(value_parser!(IpAddr)),
        )
        .arg(
            Arg::new("cut")
                .long("cut")
                .help("Sever the link to this neighbour once the table converges")
                .value_parser(value_parser!(NodeId)),
        )
        .arg(
            Arg::new("until-converged")
                .long("until-converged")
                .help("Exit once the table has settled (after --cut, if given) and print it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("origin-attempts")
                .long("origin-attempts")
                .help("Transmissions of an originated link failure before giving up [default: 3]")
                .value_parser(clap::builder::RangedU64ValueParser::<u32>::new().range(1..)),
        )
        .get_matches();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dvr_node=info,dvr_protocols=info,dvr_routing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Both are required, so clap has already rejected their absence
    let (Some(&port), Some(&id)) = (matches.get_one::<u16>("port"), matches.get_one::<NodeId>("id")) else {
        return ExitCode::FAILURE;
    };

    let mut config = match NodeConfig::from_env(id, port) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = matches.get_one::<PathBuf>("config") {
        config = config.with_config_path(path);
    }
    if let Some(&ms) = matches.get_one::<u64>("timeout-ms") {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(&ip) = matches.get_one::<IpAddr>("ip") {
        config = config.with_ip(ip);
    }
    if let Some(&peer) = matches.get_one::<NodeId>("cut") {
        config = config.with_cut(peer);
    }
    if let Some(&attempts) = matches.get_one::<u32>("origin-attempts") {
        config = config.with_router(RouterConfig::default().with_origin_attempts(attempts));
    }
    let until_converged = matches.get_flag("until-converged");
    if until_converged {
        config = config.with_until_converged();
    }

    info!(node = %id, port, config = %config.config_path.display(), "Starting DVR node");

    let node = match NodeRuntime::bind(config).await {
        Ok(node) => node,
        Err(e) => {
            error!(error = %e, "failed to start node");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C, stopping");
        }
    };

    match node.run(shutdown).await {
        Ok(summary) => {
            for report in &summary.reports {
                if let BroadcastReport::DeliveryFailed { link, unacked } = report {
                    warn!(%link, ?unacked, "link failure was not confirmed by every neighbour");
                }
            }
            if until_converged {
                println!("{}", summary.table);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "node failed");
            ExitCode::FAILURE
        }
    }
}
