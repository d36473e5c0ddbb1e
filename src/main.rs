// src/main.rs

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::ExitCode;

use cli::{Cli, Commands};
use netconf_exec::config::Config;
use netconf_exec::connector::{ConnectParams, Connector, Credential, SshCommandConnector, TcpConnector};
use netconf_exec::devices::{DeviceRegistry, TransportKind, NETCONF_SSH_PORT};
use netconf_exec::errors::NetconfError;
use netconf_exec::operation::Operation;
use netconf_exec::session::{Session, SessionOptions};
use netconf_exec::Executor;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = Cli::parse();
    let json = cli_args.json;

    match run(cli_args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, json);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli_args: Cli) -> Result<()> {
    let config = Config::load(cli_args.config.as_deref())?;
    init_tracing(&cli_args, &config)?;
    debug!("Loaded app config: {:?}", config);

    let registry = DeviceRegistry::load(config.devices_file_path.as_deref())?;

    let Some(operation) = cli_args.command.to_operation()? else {
        // Only `devices` runs without a session
        if let Commands::Devices = cli_args.command {
            list_devices(&registry, cli_args.json)?;
        }
        return Ok(());
    };

    let (connector, params, options) = resolve_target(&cli_args, &config, &registry)?;
    info!("Connecting to {}@{}:{}", params.username, params.host, params.port);
    let session = Session::connect(connector.as_ref(), &params, options).await?;

    let executor = Executor::new();
    let outcome = executor.execute(&session, &operation).await;

    // One session per invocation; leave it cleanly whatever the outcome.
    if !matches!(operation, Operation::CloseSession) {
        if let Err(e) = executor.execute(&session, &Operation::CloseSession).await {
            warn!("close-session failed: {}", e);
            session.close().await;
        }
    }

    let reply = outcome?;
    if cli_args.json {
        let body = serde_json::json!({
            "ok": true,
            "operation": operation.kind(),
            "data": reply.as_ref().map(|element| element.to_xml()),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        match reply {
            Some(element) => println!("{}", element.to_xml()),
            None => println!("ok"),
        }
    }
    Ok(())
}

fn init_tracing(cli_args: &Cli, config: &Config) -> Result<()> {
    // RUST_LOG wins, then --log-level, then config.toml
    let level = cli_args
        .log_level
        .map(|level| level.as_str().to_string())
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let installed = if cli_args.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Setting default tracing subscriber failed")
}

fn resolve_target(
    cli_args: &Cli,
    config: &Config,
    registry: &DeviceRegistry,
) -> Result<(Box<dyn Connector>, ConnectParams, SessionOptions)> {
    let base = config.session.options();

    if let Some(name) = &cli_args.device {
        let device = registry.get(name)?;
        let mut params = device.connect_params();
        if let Some(username) = &cli_args.username {
            params.username = username.clone();
        }
        if let Some(identity) = &cli_args.identity {
            params.credential = Credential::IdentityFile(identity.clone());
        }
        if let Some(port) = cli_args.port {
            params.port = port;
        }
        let connector = match cli_args.transport {
            Some(kind) => connector_for(kind.into(), device.host_key_check),
            None => device.connector(),
        };
        return Ok((connector, params, device.session_options(&base)));
    }

    let Some(host) = &cli_args.host else {
        bail!("no device given; use --device NAME or --host HOST");
    };
    let username = match &cli_args.username {
        Some(username) => username.clone(),
        None => std::env::var("USER").context("--username not given and $USER is unset")?,
    };
    let credential = cli_args
        .identity
        .clone()
        .map(Credential::IdentityFile)
        .unwrap_or_default();
    let params = ConnectParams::new(host, username, credential, cli_args.port.unwrap_or(NETCONF_SSH_PORT));
    let kind = cli_args.transport.map(TransportKind::from).unwrap_or_default();
    Ok((connector_for(kind, true), params, base))
}

fn connector_for(kind: TransportKind, host_key_check: bool) -> Box<dyn Connector> {
    match kind {
        TransportKind::Ssh => Box::new(SshCommandConnector {
            host_key_check,
            ..Default::default()
        }),
        TransportKind::Tcp => Box::new(TcpConnector),
    }
}

fn list_devices(registry: &DeviceRegistry, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&registry.devices)?);
        return Ok(());
    }
    if registry.devices.is_empty() {
        println!("No devices configured.");
    }
    for name in registry.names() {
        let device = registry.get(name)?;
        println!(
            "{:<20} {}@{}:{} ({:?})",
            name, device.username, device.address, device.port, device.transport
        );
    }
    Ok(())
}

fn report_error(e: &anyhow::Error, json: bool) {
    let netconf = e.downcast_ref::<NetconfError>();
    if json {
        let body = match netconf {
            Some(err) => serde_json::json!({
                "ok": false,
                "kind": err.kind(),
                "fault": err.fault(),
                "errors": err.errors(),
                "message": err.to_string(),
                "diagnosis": match err {
                    NetconfError::Protocol { diagnosis, .. } => diagnosis.clone(),
                    _ => None,
                },
            }),
            None => serde_json::json!({ "ok": false, "message": format!("{:#}", e) }),
        };
        println!("{}", body);
        return;
    }
    match netconf {
        Some(err) => {
            error!("{} failed", err.kind());
            eprintln!("error ({}): {}", err.kind(), err);
            if let NetconfError::Protocol {
                diagnosis: Some(diagnosis),
                ..
            } = err
            {
                eprintln!("  note: {}", diagnosis);
            }
        }
        None => eprintln!("error: {:#}", e),
    }
}
