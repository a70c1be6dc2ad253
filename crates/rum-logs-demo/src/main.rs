// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use rum_logs::{logger::Formatter, CollectorConfig, LogCollector, TracingAgent};

#[cfg(unix)]
use rum_logs::StderrRedirect;

#[tokio::main]
pub async fn main() {
    let config = match CollectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("Invalid log collector configuration: {e}");
            return;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);

    // Diagnostics go to stdout: stderr is what the collector captures.
    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stdout)
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    #[cfg(unix)]
    let source = Box::new(StderrRedirect::new());
    #[cfg(not(unix))]
    {
        error!("stderr capture is only supported on unix platforms");
        return;
    }

    #[cfg(unix)]
    run(config, source).await;
}

#[cfg(unix)]
async fn run(config: CollectorConfig, source: Box<StderrRedirect>) {
    let collector = match LogCollector::new(source, Arc::new(TracingAgent), &config) {
        Ok(collector) => collector,
        Err(e) => {
            error!("Error creating log collector: {e}");
            return;
        }
    };

    if let Err(e) = collector.start() {
        error!("Error starting log collector: {e}");
        return;
    }
    info!(
        "Log collector started: buffering={} max_buffer_size={} flush_interval={:?} destination={:?}",
        collector.config().enabled(),
        collector.config().max_buffer_size(),
        collector.config().flush_interval(),
        collector.destination().get()
    );

    let send_test_log = env::var("RUM_LOGS_SEND_TEST_LOG")
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);
    if send_test_log {
        match collector.send_test_log().await {
            Ok(()) => info!("HEC connectivity test succeeded"),
            Err(e) => warn!("HEC connectivity test failed: {e}"),
        }
    }

    eprintln!("demo: application started");
    eprintln!("demo: simulated network error: connection reset by peer");
    eprintln!("demo: simulated application error: checkout failed");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!("Unable to listen for shutdown signal: {e}"),
    }

    if let Err(e) = collector.shutdown().await {
        error!("Error stopping log collector: {e}");
    }
}
