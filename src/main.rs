use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use rterm::app;
use rterm::config::Args;

fn main() -> Result<()> {
    let args = Args::parse().normalize();

    // --debug wins over RUST_LOG
    let filter = if args.debug {
        EnvFilter::new("rterm=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    if args.version {
        app::print_version(&args);
        return Ok(());
    }

    app::run(args)
}
