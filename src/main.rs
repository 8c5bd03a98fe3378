use std::fmt::Debug;
use std::fmt::Display;

use tokio::task::JoinError;
use weather_digest::configuration::get_configuration;
use weather_digest::dispatch::init_dispatch_worker;
use weather_digest::startup::Application;
use weather_digest::telemetry::get_subscriber;
use weather_digest::telemetry::init_subscriber;

fn report_exit(
    name: &str,
    outcome: Result<Result<(), impl Debug + Display>, JoinError>,
) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }

        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (inner)"
            )
        }

        Err(e) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (outer)"
            )
        }
    }
}

/// Initialise telemetry, load config, then run the API and the daily
/// dispatch worker until either exits.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("weather-digest", "info", std::io::stdout);
    init_subscriber(subscriber)?;

    let cfg = get_configuration()?;
    // reject a bad schedule before binding anything
    let schedule = cfg.dispatch.schedule().map_err(anyhow::Error::msg)?;

    let app = Application::build(cfg.clone()).await?;
    let dispatcher = app.dispatcher();
    let server_thread = tokio::spawn(app.run_until_stopped());

    if !cfg.dispatch.enabled {
        tracing::info!("Scheduled dispatch is disabled; use POST /admin/dispatch");
        report_exit("API", server_thread.await);
        return Ok(());
    }

    let dispatch_worker_thread = tokio::spawn(init_dispatch_worker(dispatcher, schedule));

    // Waits on both branches, returning when the **first** completes
    tokio::select! {
        o = server_thread => { report_exit("API", o) },
        o = dispatch_worker_thread => { report_exit("Daily dispatch worker", o) },
    }

    Ok(())
}
