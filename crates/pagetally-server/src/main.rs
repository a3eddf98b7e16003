// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PageTally — print accounting back office
//
// Entry point. Initialises logging and backend services, then runs queue
// maintenance on a fixed interval until interrupted.

use std::time::Duration;

use chrono::Utc;
use pagetally_server::AppServices;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("PageTally starting");

    let svc = match AppServices::init() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "backend services failed to start");
            std::process::exit(1);
        }
    };

    let period = Duration::from_secs(svc.config().prune_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let worker = svc.clone();
                // Pruning touches the file system and SQLite.
                match tokio::task::spawn_blocking(move || worker.run_maintenance(Utc::now())).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "maintenance run failed"),
                    Err(e) => tracing::error!(error = %e, "maintenance task panicked"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "signal handler failed");
                }
                break;
            }
        }
    }

    svc.shutdown();
    tracing::info!("PageTally stopped");
}
