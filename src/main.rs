use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use wsload::cli::{self, Args};
use wsload::report::{OutputFormat, StdoutSink};
use wsload::shutdown::route_interrupts;
use wsload::{RunController, WsTransport};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::from_env();

    let (config, transport_config) = match args.into_config() {
        Ok(configs) => configs,
        Err(e) => {
            eprintln!("error: {e}\n");
            eprintln!("{}", cli::usage());
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&args.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let format = args.output_format();
    if format == OutputFormat::Text {
        println!("wsload: {} load test", transport_config.protocol);
        println!("  Server:      {}", config.url());
        println!("  Connections: {}", config.connections());
        println!("  Duration:    {} s", config.duration().as_secs());
        println!("  Rate:        {} msg/s per connection", config.rate());
        println!("{}", "━".repeat(48));
    }

    let controller = RunController::new(
        config,
        Arc::new(WsTransport::new(transport_config)),
        Arc::new(StdoutSink::new(format)),
    );

    // Listens from here until exit, so Ctrl-C during teardown still aborts.
    let interrupt = route_interrupts(ctrl_c, || {
        eprintln!("Aborted.");
        std::process::exit(130);
    });

    match controller.run(interrupt).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            error!(error = %e, "cannot start run");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

async fn ctrl_c() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            false
        }
    }
}
