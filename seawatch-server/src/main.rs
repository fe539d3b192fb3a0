use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use seawatch_server::{config, Cli, Session, VERSION};
use tokio_graceful_shutdown::Toplevel;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let watch_config = config::load_config(&args)?;

    if args.print_config {
        println!(
            "{}",
            serde_json::to_string_pretty(&watch_config).into_diagnostic()?
        );
        return Ok(());
    }

    log::info!(
        "SeaWatch {} watching {}:{}",
        VERSION,
        watch_config.connection.host,
        watch_config.connection.port
    );

    Toplevel::new(|s| async move {
        Session::new(&s, args, watch_config);
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}
