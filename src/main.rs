//! Demo binary running `replygate` exchanges over the loopback transport.
//!
//! Sends `--requests` requests concurrently, waits for each reply and prints
//! the outcome. Exits non-zero if any exchange fails.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use cli::{Cli, ReplyBehaviour};
use futures::future::join_all;
use replygate::{
    Message,
    SyncGateway,
    loopback::{LoopbackTransport, Responder, ResponderMode},
};
use tracing::{error, info};

const REQUEST_DESTINATION: &str = "replygate.demo.request";

fn responder_mode(behaviour: ReplyBehaviour) -> ResponderMode {
    match behaviour {
        ReplyBehaviour::Echo => ResponderMode::Echo,
        ReplyBehaviour::Mismatch => ResponderMode::Mismatch,
        ReplyBehaviour::Uncorrelated => ResponderMode::Uncorrelated,
        ReplyBehaviour::Silent => ResponderMode::Silent,
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving Prometheus metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.metrics_addr.is_some() {
        tracing::warn!("built without the `metrics` feature; --metrics-addr ignored");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    install_metrics(&cli)?;

    let transport = Arc::new(LoopbackTransport::new());
    transport.attach_responder(
        REQUEST_DESTINATION,
        Responder::new(responder_mode(cli.behaviour))
            .with_delay(Duration::from_millis(cli.delay_ms)),
    );

    let mut builder = SyncGateway::builder(Arc::clone(&transport))
        .name("replygate-demo")
        .destination(REQUEST_DESTINATION)
        .timeout(Duration::from_millis(cli.timeout_ms))
        .polling_interval(Duration::from_millis(cli.interval_ms));
    if let Some(shared) = &cli.shared_reply {
        builder = builder.shared_reply_destination(shared.clone());
    }
    let gateway = builder.build()?;

    let exchanges = (0..cli.requests).map(|n| {
        let gateway = &gateway;
        async move {
            let outcome = gateway.exchange(Message::new(format!("request #{n}"))).await;
            (n, outcome)
        }
    });

    let mut failures = 0_u32;
    for (n, outcome) in join_all(exchanges).await {
        match outcome {
            Ok(reply) => println!(
                "#{n}: {}",
                String::from_utf8_lossy(reply.payload().as_ref())
            ),
            Err(e) => {
                failures += 1;
                error!(request = n, error = %e, "exchange failed");
                println!("#{n}: {e}");
            }
        }
    }
    info!(
        requests = cli.requests,
        failures,
        live_ephemeral = transport.live_ephemeral_count(),
        "demo finished"
    );

    if failures > 0 {
        return Err(format!("{failures} of {} exchanges failed", cli.requests).into());
    }
    Ok(())
}
