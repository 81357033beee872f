mod cli;
mod logging;
mod output;

use anyhow::{Context, Result};
use cli::CliConfig;
use output::CaptureSummary;
use procevents::{EventEngine, EventStreams, ProcessEvent};
use std::io::Write;
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse_args()?;
    logging::init_logger(cli.verbosity, cli.quiet_mode)?;

    let config = cli.engine_config()?;
    log::debug!("engine configuration: {:?}", config);

    let (engine, streams) = EventEngine::start(&config).context(
        "Failed to subscribe to kernel process events (root or CAP_NET_ADMIN is required)",
    )?;

    if !cli.quiet_mode {
        eprintln!("Capturing process events... Press Ctrl+C to stop");
    }

    let printed = print_events(&cli, streams).await;
    let stopped = engine.stop().await;

    let summary = printed?;
    if let Err(e) = stopped {
        log::warn!("capture did not shut down cleanly: {}", e);
    }

    if !cli.quiet_mode {
        eprintln!("\n{}", summary.format());
    }
    Ok(())
}

/// Print events until SIGINT or SIGTERM arrives
async fn print_events(cli: &CliConfig, mut streams: EventStreams) -> Result<CaptureSummary> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let format = cli.output_format();
    let mut summary = CaptureSummary::default();
    let mut stdout = std::io::stdout().lock();

    loop {
        let event: ProcessEvent = tokio::select! {
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            Some(ev) = streams.fork.recv() => ev.into(),
            Some(ev) = streams.exec.recv() => ev.into(),
            Some(ev) = streams.exit.recv() => ev.into(),
            Some(err) = streams.errors.recv() => {
                summary.record_error();
                if !cli.quiet_mode {
                    eprintln!("Warning: {}", err);
                }
                continue;
            }
        };

        if !cli.wants(&event) {
            continue;
        }
        summary.record(&event);

        let line = output::render(format, &event)?;
        writeln!(stdout, "{}", line).context("Failed to write event")?;
        stdout.flush().context("Failed to write event")?;
    }

    Ok(summary)
}
