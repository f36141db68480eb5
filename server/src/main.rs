#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]

mod cli;
mod configuration;
mod database_string;
mod healthcheck;
mod ldap_server;
mod logging;
mod tls;

use crate::{
    cli::{Command, RunOpts},
    configuration::Configuration,
    database_string::DatabaseUrl,
};
use anyhow::{bail, Context, Result};
use idbridge_sql_backend_handler::{sql_tables, SqlBackendHandler};
use sea_orm::{Database, DatabaseConnection};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

async fn connect_to_database(database_url: &DatabaseUrl) -> Result<DatabaseConnection> {
    let num_connections = if database_url.db_type() == "sqlite" {
        1
    } else {
        5
    };
    let mut sql_opt = sea_orm::ConnectOptions::new(database_url.to_string());
    sql_opt
        .max_connections(num_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    Database::connect(sql_opt)
        .await
        .with_context(|| format!("while connecting to {:?}", database_url))
}

/// Resolves once Ctrl-C or, on unix, SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {:#}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {:#}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[instrument(skip_all)]
async fn set_up_server(
    config: &Configuration,
    shutdown: CancellationToken,
) -> Result<(tokio::task::JoinSet<()>, DatabaseConnection)> {
    info!("Starting idbridge version {}", env!("CARGO_PKG_VERSION"));
    let sql_pool = connect_to_database(&config.database_url).await?;
    let backend_handler = SqlBackendHandler::new(sql_pool.clone());
    let servers = ldap_server::build_ldap_server(config, backend_handler, shutdown)
        .await
        .context("while binding the LDAP server")?;
    Ok((servers, sql_pool))
}

async fn run_server_command(opts: RunOpts) -> Result<()> {
    debug!("CLI: {:#?}", &opts);

    let config = configuration::init(opts)?;
    logging::init(&config)?;

    let shutdown = CancellationToken::new();
    let (mut servers, sql_pool) = set_up_server(&config, shutdown.clone()).await?;

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutting down");
            shutdown.cancel();
        }
        Some(result) = servers.join_next() => {
            if let Err(e) = result {
                error!("A listener stopped unexpectedly: {:#}", e);
            }
            shutdown.cancel();
        }
    }
    while let Some(result) = servers.join_next().await {
        if let Err(e) = result {
            error!("Error while stopping a listener: {:#}", e);
        }
    }
    if let Err(e) = sql_pool.close().await {
        error!("Error closing database connection pool: {}", e);
    }
    info!("Server stopped");
    Ok(())
}

async fn run_healthcheck(opts: RunOpts) -> Result<()> {
    debug!("CLI: {:#?}", &opts);
    let config = configuration::init(opts)?;
    logging::init(&config)?;

    info!("Starting healthchecks");

    use tokio::time::timeout;
    let delay = Duration::from_millis(3000);
    let (ldap, ldaps) = tokio::join!(
        timeout(
            delay,
            healthcheck::check_ldap(&config.healthcheck_options.ldap_host, config.ldap_port)
        ),
        timeout(
            delay,
            healthcheck::check_ldaps(&config.healthcheck_options.ldap_host, &config.ldaps_options)
        ),
    );

    let failures = [ldap, ldaps]
        .into_iter()
        .filter_map(|res| res.context("timed out").and_then(|r| r).err())
        .inspect(|e| error!("Error running the health check: {:#}", e))
        .count();
    if failures > 0 {
        bail!("Healthcheck failed")
    } else {
        Ok(())
    }
}

async fn create_schema_command(opts: RunOpts) -> Result<()> {
    debug!("CLI: {:#?}", &opts);
    let config = configuration::init(opts)?;
    logging::init(&config)?;
    let sql_pool = connect_to_database(&config.database_url).await?;
    sql_tables::init_table(&sql_pool)
        .await
        .context("while creating base tables")?;
    info!("Schema created successfully.");
    if let Err(e) = sql_pool.close().await {
        error!("Error closing database connection pool: {}", e);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_opts = cli::init();
    match cli_opts.command {
        Command::Run(opts) => run_server_command(opts).await,
        Command::HealthCheck(opts) => run_healthcheck(opts).await,
        Command::CreateSchema(opts) => create_schema_command(opts).await,
    }
}
