use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use tokio::signal;
use tokio::sync::oneshot;
use lungsim::api::rest::RestApi;
use lungsim::config::{load_config, Config};
use lungsim::simulation::scenario::Scenario;

const CONFIG_PATH: &str = "config.yaml";

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn read_config() -> Result<Config, Box<dyn Error>> {
    let path = Path::new(CONFIG_PATH);
    if !path.exists() {
        log::warn!("{} not found, using default configuration", CONFIG_PATH);
        return Ok(Config::default());
    }
    Ok(load_config(path)?)
}

/// `lungsim scenario <file>`: runs a scenario file and prints its telegrams.
fn run_scenario(config: &Config, path: &str) -> Result<(), Box<dyn Error>> {
    let scenario = Scenario::from_file(path)?;
    let outcome = scenario.execute(config.simulation.max_iterations)?;
    if let Some(summary) = &outcome.summary {
        log::info!(
            "{} samples, peak {} cmH2O, trough {} cmH2O, tidal volume {:.1} ml",
            summary.samples,
            summary.peak_pressure,
            summary.trough_pressure,
            summary.tidal_volume
        );
    }
    println!("{}", serde_json::to_string_pretty(&outcome.telegrams()?)?);
    Ok(())
}

async fn serve(config: Config) -> Result<(), Box<dyn Error>> {
    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    let api = RestApi::new(&config);

    log::info!("Starting server on {}", addr);

    // Create a channel for shutdown signal
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let (_, server) = warp::serve(api.routes())
        .bind_with_graceful_shutdown(addr, async move {
            shutdown_rx.await.ok();
            log::info!("Shutting down server...");
        });

    let server_handle = tokio::spawn(server);

    signal::ctrl_c().await?;
    log::info!("Ctrl+C received, starting graceful shutdown");

    shutdown_tx.send(()).ok();
    server_handle.await?;

    log::info!("Server shutdown complete ({} sessions dropped)", api.sessions().len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let config = read_config()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [command, path] if command == "scenario" => run_scenario(&config, path),
        [] => serve(config).await,
        [command] if command == "serve" => serve(config).await,
        _ => Err("usage: lungsim [serve | scenario <file>]".into()),
    }
}
