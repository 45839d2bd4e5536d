/**
 * WAWADO - network watchdog entry point
 *
 * ROLE: loads configuration, connects the chat bridge, then starts host
 * liveness polling (--isalive) and/or device presence watching (--dash).
 *
 * EXIT: 0 after a `stop` command or Ctrl-C, 1 when configuration cannot be
 * loaded or host monitoring dies on a failed scan.
 */

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use wawado_kernel::config::{load_client_config, load_config, resolve_config_path};
use wawado_kernel::dispatch::CommandDispatcher;
use wawado_kernel::hosts::HostSetMonitor;
use wawado_kernel::presence::PresenceWatcher;
use wawado_kernel::probe::PingProbe;
use wawado_kernel::transport::{spawn_event_loop, BusEvent, MqttChat};
use wawado_kernel::watchdog::WatchdogLoop;

const ACK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "wawado", version, about = "Network watchdog forwarding events to your phone")]
struct Cli {
    /// Watch the hosts listed in the host file
    #[arg(long)]
    isalive: bool,
    /// Watch for registered devices reported by wawado-plugin-arp
    #[arg(long)]
    dash: bool,
    /// Kernel configuration (defaults to $WAWADO_CONFIG, then wawado.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// key=value file with credentials and default receiver
    #[arg(long, default_value = "client.config")]
    client: PathBuf,
    /// Host list, overrides watchdog.hostfile
    #[arg(long)]
    hostfile: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("wawado: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.isalive && !cli.dash {
        bail!("nothing to watch, pass --isalive and/or --dash");
    }

    let cfg_path = resolve_config_path(cli.config.as_deref());
    let cfg = load_config(&cfg_path).await.context("Failed to load kernel configuration")?;
    let client_cfg = load_client_config(&cli.client)
        .await
        .context("Failed to load client configuration")?;

    let (chat, eventloop) = MqttChat::connect(
        &cfg.mqtt,
        &client_cfg,
        Duration::from_secs(cfg.chat.ack_timeout_secs),
    );
    let chat = Arc::new(chat);
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let bus = spawn_event_loop(eventloop, chat.client().clone(), chat.acks().clone(), events_tx);

    if let Some(greeting) = client_cfg.init_message.clone() {
        let chat = chat.clone();
        let receiver = client_cfg.receiver.clone();
        tokio::spawn(async move {
            if let Err(e) = chat.send_to(&receiver, &greeting).await {
                warn!("[kernel] greeting not delivered: {}", e);
            }
        });
    }

    let mut watchdog_task = None;
    let mut dispatcher = None;
    if cli.isalive {
        let hostfile = cli.hostfile.clone().unwrap_or_else(|| cfg.watchdog.hostfile.clone());
        let monitor = HostSetMonitor::from_file(&hostfile, PingProbe::new())
            .await
            .context("Failed to load host list")?;
        let watchdog = WatchdogLoop::new(monitor, chat.clone(), cfg.watchdog.timings());
        dispatcher = Some(CommandDispatcher::new(watchdog.handle()));
        watchdog_task = Some(tokio::spawn(watchdog.run()));
    }

    let mut presence = None;
    if cli.dash {
        let watcher = PresenceWatcher::new(
            chat.clone(),
            Duration::from_millis(cfg.presence.cooldown_millis),
        );
        for device in &cfg.presence.devices {
            watcher
                .register(device.to_device(&cfg_path)?)
                .context("Failed to register device")?;
        }
        presence = Some(Arc::new(watcher));
    }

    let router = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                BusEvent::Inbound(msg) => match &dispatcher {
                    Some(dispatcher) => {
                        dispatcher.dispatch(&msg.body);
                    }
                    None => debug!("[kernel] no watchdog running, ignoring {:?} from {}", msg.body, msg.from),
                },
                BusEvent::Presence(report) => {
                    if let Some(watcher) = &presence {
                        let watcher = watcher.clone();
                        tokio::spawn(async move {
                            watcher.observe(&report.mac).await;
                        });
                    }
                }
            }
        }
    });

    info!("[kernel] running (isalive: {}, dash: {})", cli.isalive, cli.dash);
    let outcome = match watchdog_task {
        Some(task) => tokio::select! {
            joined = task => joined.context("watchdog task panicked")?,
            _ = tokio::signal::ctrl_c() => {
                info!("[kernel] interrupted");
                Ok(())
            }
        },
        None => {
            tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;
            info!("[kernel] interrupted");
            Ok(())
        }
    };

    if tokio::time::timeout(ACK_DRAIN_TIMEOUT, chat.acks().wait_drained()).await.is_err() {
        warn!("[kernel] exiting with {} unacknowledged message(s)", chat.acks().outstanding());
    }
    router.abort();
    bus.abort();

    outcome.context("Host monitoring stopped on a failed scan")?;
    info!("[kernel] bye");
    Ok(())
}
