use sable_access_server::{config::ServerConfig, describe_report, AccessServer};

use std::path::PathBuf;
use structopt::StructOpt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab")]
struct Opts {
    /// Server config file location
    #[structopt(short, long)]
    server_conf: PathBuf,

    /// Validate the rule file, print the load report and exit
    #[structopt(long)]
    check_only: bool,
}

/// Main entry point.
///
/// Loads the server config and rule file, reporting any rule that failed to
/// load, then answers operator commands from standard input until it closes.
pub fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();
    let config = ServerConfig::load_file(&opts.server_conf)?;

    if opts.check_only {
        let (_, report) = AccessServer::load(&config.rules_file)?;
        for line in describe_report(&report) {
            println!("{}", line);
        }
        if !report.is_clean() {
            anyhow::bail!("{} rules failed to load", report.skipped.len());
        }
        return Ok(());
    }

    sable_access_server::build_subscriber(config.log.clone())?.init();

    let (mut server, report) = AccessServer::load(&config.rules_file)?;
    for line in describe_report(&report) {
        tracing::info!("{}", line);
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    server.run(stdin.lock(), stdout.lock())?;

    tracing::info!("Control input closed, shutting down");
    Ok(())
}
