//! wawado-plugin-arp: publishes every ARP sender seen on the local network
//! to `wawado/presence/observed@v1`. Needs root for the raw socket.

mod capture;

use anyhow::{Context, Result};
use capture::Sighting;
use clap::Parser;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::process::ExitCode;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use wawado_kernel::transport::{PresenceEvent, PRESENCE_TOPIC};

const CLIENT_ID: &str = "wawado-plugin-arp";

#[derive(Debug, Parser)]
#[command(name = "wawado-plugin-arp", version, about = "ARP presence reporter for wawado")]
struct Cli {
    /// Interface to listen on (default: first active non-loopback)
    #[arg(long, env = "WAWADO_ARP_INTERFACE")]
    interface: Option<String>,
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,
    #[arg(long, default_value_t = 1883)]
    mqtt_port: u16,
}

fn presence_event(sighting: Sighting) -> PresenceEvent {
    PresenceEvent {
        mac: sighting.mac,
        ip: Some(sighting.ip),
        ts: Some(humantime::format_rfc3339_seconds(SystemTime::now()).to_string()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if !nix::unistd::geteuid().is_root() {
        error!("[arp] root permissions are required for ARP capture");
        return ExitCode::from(1);
    }

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[arp] {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let interface = capture::select_interface(cli.interface.as_deref())?;

    let mut opts = MqttOptions::new(CLIENT_ID, &cli.mqtt_host, cli.mqtt_port);
    opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(opts, 64);

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("[arp] connected to broker"),
                Ok(_) => {}
                Err(e) => {
                    warn!("[arp] MQTT error: {:?}. Reconnecting...", e);
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let (tx, mut rx) = mpsc::channel::<Sighting>(256);
    let capture_thread = std::thread::spawn(move || capture::capture(&interface, tx));

    while let Some(sighting) = rx.recv().await {
        let event = presence_event(sighting);
        let payload = serde_json::to_vec(&event)?;
        match client.publish(PRESENCE_TOPIC, QoS::AtLeastOnce, false, payload).await {
            Ok(()) => debug!("[arp] published {}", event.mac),
            Err(e) => warn!("[arp] publish failed for {}: {:?}", event.mac, e),
        }
    }

    // channel closed: the capture thread ended
    match capture_thread.join() {
        Ok(result) => result.context("ARP capture stopped"),
        Err(_) => anyhow::bail!("ARP capture thread panicked"),
    }
}
