//! Prometheus to webservice forwarder
//!
//! This application scrapes a metrics-exposing HTTP endpoint on a recurring
//! schedule, waits for the exporter to publish a stable payload, flattens
//! the exposition into records and forwards them to a storage webservice.
//!
//! # Architecture
//!
//! One supervised forward loop runs per process:
//! - **Resolve**: endpoint and credentials are re-resolved every cycle so
//!   rotation is picked up without a restart
//! - **Scrape**: authenticated calls with bounded retry, polled until two
//!   consecutive payloads are identical
//! - **Extract**: exposition text becomes flat label/value/timestamp records
//! - **Upload**: records are posted to the webservice in batches
//!
//! # Features
//!
//! - Automatic restart of the forward loop on task failure
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Configuration file re-read on every cycle
//! - Tolerates slow-starting and still-writing exporters

mod config;
mod endpoint;
mod error;
mod extract;
mod scrape;
mod secrets;
mod upload;

#[cfg(test)]
mod test_utils;

use crate::endpoint::Resolver;
use crate::scrape::{Executor, PollerConfig, RequestSpec, RetryPolicy, StabilizationPoller};
use crate::secrets::{ApiServerSecretStore, SecretStore};
use crate::upload::UploadCredentials;
use chrono::Utc;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinError;
use tokio::time::{sleep, Duration};

/// Wait before re-reading a configuration file that failed to load.
const RELOAD_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Application entry point.
///
/// Initializes configuration and logging, prepares the long-lived clients,
/// and supervises the forward loop with signal handling for graceful
/// shutdown.
#[tokio::main]
async fn main() {
    let app_config = Arc::new(config::load_app_config().expect("Failed to load AppConfig"));
    tracing_subscriber::fmt()
        .with_max_level(app_config.log_level())
        .init();

    let store: Arc<dyn SecretStore> = match ApiServerSecretStore::from_ambient() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!("error occurred while creating secret store client, halting: {err:?}");
            return;
        }
    };

    // Executor and uploader live for the whole process so their connection
    // pools are reused across cycles.
    let executor = Arc::new(Executor::new(RetryPolicy::default()));
    let uploader = Arc::new(upload::Client::new(app_config.upload_service_url.clone()));

    let create_forward_task = || -> tokio::task::JoinHandle<()> {
        tokio::spawn(run_forward_loop(
            Arc::clone(&app_config),
            Arc::clone(&store),
            Arc::clone(&executor),
            Arc::clone(&uploader),
        ))
    };
    let mut forward_task = create_forward_task();

    let mut sig_term = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    tracing::info!("Running... Press Ctrl-C or send SIGTERM to terminate.");
    loop {
        tokio::select! {
            // Handle SIGTERM for graceful shutdown in containers
            _ = sig_term.recv() => {
                tracing::info!("Received SIGTERM. Exiting...");
                break;
            }
            // Handle Ctrl-C for manual termination
            _ = ctrl_c() => {
                tracing::info!("Received SIGINT. Exiting...");
                break;
            }
            // Restart the forward loop if it ever ends
            result = &mut forward_task => {
                handle_task_result("forward_loop", result);
                forward_task = create_forward_task();
            }
        }
    }
}

/// Runs polling cycles forever.
///
/// The scrape configuration is re-read at the top of every cycle so interval,
/// target and filter changes apply without a restart.
async fn run_forward_loop(
    app_config: Arc<config::AppConfig>,
    store: Arc<dyn SecretStore>,
    executor: Arc<Executor>,
    uploader: Arc<upload::Client>,
) {
    loop {
        let scrape_config = match config::load_scrape_config(&app_config.config_path) {
            Ok(scrape_config) => scrape_config,
            Err(err) => {
                tracing::error!(
                    "error occurred while parsing scraper configuration: {err}, retrying in {:?}...",
                    RELOAD_RETRY_DELAY
                );
                sleep(RELOAD_RETRY_DELAY).await;
                continue;
            }
        };

        tracing::info!("Starting loop...");
        run_cycle(&scrape_config, &store, &executor, &uploader).await;

        tracing::debug!(
            "Polling interval set to {:?}, starting sleep...",
            scrape_config.exporter.polling_interval
        );
        sleep(scrape_config.exporter.polling_interval).await;
    }
}

/// Executes one scrape-extract-upload cycle.
///
/// # Error Handling
///
/// - A failed password lookup skips the cycle; credentials may recover next
///   round
/// - Scrape failures are absorbed by the poller, which blocks until the
///   exporter yields stable content
/// - A malformed payload drops the cycle's batch; nothing partial is
///   uploaded
/// - Upload failures are logged and the cycle proceeds to its sleep phase
async fn run_cycle(
    scrape_config: &config::ScrapeConfig,
    store: &Arc<dyn SecretStore>,
    executor: &Executor,
    uploader: &upload::Client,
) {
    let password_ref = &scrape_config.database.password_secret_ref;
    let password_secret = match store.get(&password_ref.name, &password_ref.namespace).await {
        Ok(secret) => secret,
        Err(err) => {
            tracing::error!(
                "error occurred while retrieving password secret, continuing to next cycle: {err}"
            );
            return;
        }
    };
    let password = match password_secret.string_value(&password_ref.key) {
        Some(password) => password,
        None => {
            tracing::error!(
                "password secret {}/{} has no key '{}', continuing to next cycle",
                password_ref.namespace,
                password_ref.name,
                password_ref.key
            );
            return;
        }
    };
    let credentials = UploadCredentials {
        username: scrape_config.database.username.clone(),
        password,
    };

    let resolver = Resolver::new(
        Arc::clone(store),
        scrape_config.exporter.api.endpoint_ref.clone(),
    );
    let poller = StabilizationPoller::new(executor, &resolver, PollerConfig::default());
    let spec = RequestSpec::from(&scrape_config.exporter.api);
    let payload = poller.poll_until_stable(&spec).await;

    let timestamp = Utc::now().timestamp();
    let records = match extract::extract_records(
        &payload,
        scrape_config.exporter.metric_name.as_deref(),
        timestamp,
    ) {
        Ok(records) => records,
        Err(err) => {
            tracing::error!("error occurred while parsing scraped metrics, skipping cycle: {err}");
            return;
        }
    };
    tracing::debug!("Extracted {} metric records", records.len());

    let upload_started = std::time::Instant::now();
    match uploader.write(&records, &credentials).await {
        Ok(_) => tracing::info!("Successfully uploaded {} records", records.len()),
        Err(err) => tracing::warn!("Error uploading metrics: {err}, continuing..."),
    }
    tracing::debug!("Upload took: {} ms", upload_started.elapsed().as_millis());
}

/// Handles the result of a tokio task, logging success or failure.
///
/// Failures (panics, cancellation) are logged at error level; the caller
/// decides whether to recreate the task.
fn handle_task_result(task_name: &str, result: Result<(), JoinError>) {
    match result {
        Ok(_) => {
            tracing::debug!("Task {} completed.", task_name);
        }
        Err(e) => {
            tracing::error!("Task {} failed: {:?}", task_name, e);
        }
    }
}
