//! traproxy: transparent HTTP/HTTPS interception through an upstream proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                   firewall REDIRECT / rdr
//!   client ─────────────────────────────────┐
//!                                           ▼
//!                   ┌──────────────────────────────────────────────┐
//!                   │                  TRAPROXY                    │
//!                   │                                              │
//!                   │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!                   │  │   net    │──▶│ dispatch │──▶│ resolver │  │
//!                   │  │ listener │   │          │   │ orig dst │  │
//!                   │  └──────────┘   └────┬─────┘   └──────────┘  │
//!                   │                      ▼                       │
//!                   │               ┌─────────────┐                │
//!                   │               │ translator  │                │
//!                   │               │ http│https  │                │
//!                   │               └──────┬──────┘                │
//!                   │          ┌───────────┴──────────┐            │
//!                   │          ▼                      ▼            │
//!                   │   ┌────────────┐        ┌──────────────┐     │
//!                   │   │http framer │───────▶│ relay (x2)   │─────┼──▶ upstream
//!                   │   └────────────┘        └──────────────┘     │    HTTP proxy
//!                   └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use traproxy::config::loader::{read_config, validate};
use traproxy::config::ProxyConfig;
use traproxy::observability::logging;
use traproxy::resolver::ResolveMethod;

#[derive(Parser)]
#[command(name = "traproxy", version)]
#[command(about = "Transparent proxy that forwards redirected connections through an HTTP proxy", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream proxy address (host:port)
    #[arg(long = "proxyaddr")]
    proxy_addr: Option<String>,

    /// Address redirected connections arrive on
    #[arg(long)]
    listen: Option<String>,

    /// DEBUG force set to destination address
    #[arg(long = "dstaddr")]
    dst_addr: Option<String>,

    /// Original-destination lookup method
    #[arg(long, value_enum)]
    resolver: Option<ResolveMethod>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(addr) = self.proxy_addr {
            config.upstream.address = addr;
        }
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(dst) = self.dst_addr {
            config.resolver.forced_destination = Some(dst);
        }
        if let Some(method) = self.resolver {
            config.resolver.method = method;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => match read_config(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("traproxy: {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability.log_level);

    if let Err(e) = validate(&config) {
        tracing::error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        "traproxy starting"
    );

    match traproxy::lifecycle::startup::run(config).await {
        Ok(()) => {
            tracing::info!("finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "traproxy stopped");
            ExitCode::FAILURE
        }
    }
}
