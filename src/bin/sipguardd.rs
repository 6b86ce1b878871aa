//! Daemon entry point: CLI parsing, tracing init, collaborator wiring,
//! signal-driven shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sipguard::aggregator::PostgresCdrSource;
use sipguard::alert::{AlertSink, CompositeAlertSink, FileAlertSink, PostgresAlertArchive, SyslogAlertSink};
use sipguard::checkpoint::PostgresCheckpointStore;
use sipguard::config::{AlertMode, Config};
use sipguard::controller::Controller;
use sipguard::error::{ConfigError, DaemonError, StoreError};
use sipguard::shutdown::ShutdownFlag;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser, Debug)]
#[command(name = "sipguardd")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config", default_value = "/etc/sipguard/sipguard.yaml")]
    config: PathBuf,
}

async fn connect(db: &sipguard::config::DbConfig) -> Result<tokio_postgres::Client, StoreError> {
    let (client, connection) = tokio_postgres::connect(&db.connection_string(), tokio_postgres::NoTls)
        .await
        .map_err(StoreError::from)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection closed with error");
        }
    });
    Ok(client)
}

fn build_alert_sink(cfg: &Config) -> Result<Box<dyn AlertSink>, DaemonError> {
    let file_sink = || -> Result<Box<dyn AlertSink>, DaemonError> {
        Ok(Box::new(
            FileAlertSink::open(&cfg.alert_file).map_err(|e| ConfigError::Io(e.to_string()))?,
        ))
    };
    let syslog_sink = || -> Result<Box<dyn AlertSink>, DaemonError> {
        Ok(Box::new(
            SyslogAlertSink::new().map_err(|e| ConfigError::Io(e.to_string()))?,
        ))
    };

    match cfg.alert_mode {
        AlertMode::File => file_sink(),
        AlertMode::Syslog => syslog_sink(),
        AlertMode::Both => Ok(Box::new(CompositeAlertSink {
            sinks: vec![syslog_sink()?, file_sink()?],
        })),
    }
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let cfg = Config::load(&args.config)?;
    tracing::info!(institution = %cfg.institution, run_mode = ?cfg.run_mode, "loaded configuration");

    let cdr_client = connect(&cfg.cdr_db).await?;
    let checkpoint_client = connect(&cfg.checkpoint_db).await?;
    let alert_client = connect(&cfg.alert_db).await?;

    let cdr_source = PostgresCdrSource::new(cdr_client, cfg.cdr_db.table.clone());
    let checkpoint_store = PostgresCheckpointStore::new(checkpoint_client, cfg.checkpoint_db.table.clone());
    let alert_archive = PostgresAlertArchive::new(alert_client, cfg.alert_db.table.clone());
    let alert_sink = build_alert_sink(&cfg)?;

    let controller = Controller::bootstrap(&cfg, cdr_source, checkpoint_store, alert_archive, alert_sink).await?;

    let shutdown = ShutdownFlag::new();
    let shutdown_watcher = shutdown.clone();
    tokio::spawn(async move {
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");
        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = int.recv() => tracing::info!("received SIGINT"),
            _ = quit.recv() => tracing::info!("received SIGQUIT"),
        }
        shutdown_watcher.set();
    });

    controller.run(&shutdown).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            tracing::error!(error = %e, "sipguardd exiting");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
