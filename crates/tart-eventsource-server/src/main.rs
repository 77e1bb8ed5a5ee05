//! Tart EventSource transport server.
//!
//! Runs the transport on its own with a logging dispatcher, for local
//! testing with a browser `EventSource`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tart_eventsource::{EventSourceTransport, ListenRequest};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod ansible;
mod config;
mod demo;
mod shutdown;
mod telemetry;

use ansible::LoggingAnsible;
use config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::from_env()
        .context("Failed to load configuration")?
        .with_cli(&cli);

    telemetry::init(config.log_format).map_err(|e| anyhow::anyhow!(e))?;

    info!("Starting tart-eventsource v{}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    let ansible = Arc::new(LoggingAnsible::new());
    let transport = EventSourceTransport::new(ansible.clone(), config.transport());

    let (fail_tx, fail_rx) = oneshot::channel();
    transport
        .listen(
            ListenRequest::new(config.host.clone(), config.port)
                .on_ok(|info| {
                    info!(
                        "Transport is listening, connect to http://{}:{}/events/<domain>",
                        info.host, info.port
                    );
                })
                .on_fail(move |e| {
                    let _ = fail_tx.send(e);
                }),
        )
        .await;

    // Both continuations run before listen returns
    if let Ok(e) = fail_rx.await {
        error!(error = %e, "Transport failed to start");
        return Err(e.into());
    }

    let demo_stop = CancellationToken::new();
    let demo = (config.demo_interval_secs > 0).then(|| {
        tokio::spawn(demo::run(
            ansible.clone(),
            Arc::clone(transport.registry()),
            Duration::from_secs(config.demo_interval_secs),
            demo_stop.clone(),
        ))
    });

    let signal = shutdown::wait_for_signal()
        .await
        .context("Failed to install signal handlers")?;
    info!(signal = ?signal, "Shutting down");

    demo_stop.cancel();
    if let Some(demo) = demo {
        let _ = demo.await;
    }

    transport
        .close(Some(Box::new(|| info!("Transport closed"))))
        .await;

    Ok(())
}
