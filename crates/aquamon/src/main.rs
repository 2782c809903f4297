use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use aquamon::Config;
use aquamon::RecordEvent;
use aquamon::SensorSnapshot;
use aquamon::api;
use aquamon::dashboard::Command;
use aquamon::dashboard::Dashboard;
use aquamon::dashboard::Pump;
use aquamon::screen;
use aquamon::source;
use aquamon::view::DashboardView;
use chrono::Local;
use clap::Parser;
use clap::Subcommand;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "aquamon", version, about = "Aquarium water monitoring dashboard")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "aquamon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Splash screen, then the live dashboard (default)
    Run,
    /// Read the record once and print the dashboard
    Show,
    /// Switch both pumps to automatic control
    Auto,
    /// Leave automatic mode and flip one pump
    Toggle {
        /// Pump number: 1 or 2
        pump: Pump,
    },
    /// Keep the subscription and HTTP API up until Ctrl+C
    Serve,
}

/// Handle to a running HTTP API server.
struct ApiServer {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl ApiServer {
    fn start(config: &Config, dashboard: Arc<Dashboard>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(api::serve(
            config.api.listen.clone(),
            config.api.port,
            dashboard,
            shutdown_rx,
        ));
        Self {
            shutdown_tx,
            handle,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        match self.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("HTTP API server error: {:#}", e),
            Err(e) => tracing::error!("HTTP API server task failed: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    // Logs go to stderr so they never interleave with the rendered screen.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(config.logging.targets()),
        )
        .init();

    tracing::info!("aquamon {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {}", args.config.display());

    let source = source::from_config(&config)?;
    let dashboard = Arc::new(Dashboard::new(source, config.source.record_path.clone()));

    match args.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run(&config, dashboard).await,
        Cmd::Show => show(&dashboard).await,
        Cmd::Auto => print_patch(dashboard.execute(Command::SetAutomatic).await?),
        Cmd::Toggle { pump } => {
            print_patch(dashboard.execute(Command::TogglePump(pump)).await?)
        }
        Cmd::Serve => serve(&config, dashboard).await,
    }
}

fn spawn_event_loop(dashboard: &Arc<Dashboard>) -> JoinHandle<()> {
    let dashboard = dashboard.clone();
    tokio::spawn(async move { dashboard.run().await })
}

async fn run(config: &Config, dashboard: Arc<Dashboard>) -> anyhow::Result<()> {
    let event_loop = spawn_event_loop(&dashboard);
    let api = config
        .api
        .enabled
        .then(|| ApiServer::start(config, dashboard.clone()));

    let result = screen::run(dashboard, config.splash.delay()).await;

    if let Some(api) = api {
        api.stop().await;
    }
    event_loop.abort();
    result
}

async fn show(dashboard: &Dashboard) -> anyhow::Result<()> {
    let record = dashboard
        .source()
        .get(dashboard.record_path())
        .await
        .context("Failed to read record")?;

    let snapshot = match RecordEvent::from_value(record) {
        RecordEvent::Value(value) => Some(SensorSnapshot::from_record(&value)),
        RecordEvent::Absent => None,
    };
    println!(
        "{}",
        DashboardView::project(snapshot.as_ref(), Local::now().naive_local())
    );
    Ok(())
}

fn print_patch(patch: aquamon::Patch) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&patch)?);
    Ok(())
}

async fn serve(config: &Config, dashboard: Arc<Dashboard>) -> anyhow::Result<()> {
    if !config.api.enabled {
        tracing::warn!("[api] is disabled; serving the subscription only");
    }

    let event_loop = spawn_event_loop(&dashboard);
    dashboard.mount();
    let api = config
        .api
        .enabled
        .then(|| ApiServer::start(config, dashboard.clone()));

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Some(api) = api {
        api.stop().await;
    }
    dashboard.unmount();
    event_loop.abort();

    tracing::info!("aquamon shutdown complete");
    Ok(())
}
