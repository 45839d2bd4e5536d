//! Passive ARP capture on one interface.
//!
//! Nothing is ever sent: frames are read from a datalink channel on a
//! dedicated thread and every ARP sender is handed to the async side.

use anyhow::{anyhow, bail, Result};
use pnet::datalink::{self, Channel, NetworkInterface};
use pnet::packet::arp::{ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::Packet;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sender of one ARP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub mac: String,
    pub ip: String,
    pub is_request: bool,
}

/// Extracts the ARP sender from a raw ethernet frame; anything else is `None`
pub fn parse_frame(frame: &[u8]) -> Option<Sighting> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(ethernet.payload())?;
    Some(Sighting {
        mac: arp.get_sender_hw_addr().to_string(),
        ip: arp.get_sender_proto_addr().to_string(),
        is_request: arp.get_operation() == ArpOperations::Request,
    })
}

/// Named interface, or the first one that is up, not loopback and has an
/// address.
pub fn select_interface(name: Option<&str>) -> Result<NetworkInterface> {
    let interfaces = datalink::interfaces();
    if let Some(name) = name {
        return interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| anyhow!("no interface named {}", name));
    }
    match interfaces
        .into_iter()
        .find(|iface| iface.is_up() && !iface.is_loopback() && iface.mac.is_some() && !iface.ips.is_empty())
    {
        Some(iface) => Ok(iface),
        None => bail!("no usable network interface found"),
    }
}

/// Reads frames until the receiving side goes away. Blocking; run it on its
/// own thread.
pub fn capture(interface: &NetworkInterface, tx: mpsc::Sender<Sighting>) -> Result<()> {
    let mut rx = match datalink::channel(interface, Default::default())? {
        Channel::Ethernet(_, rx) => rx,
        _ => bail!("unsupported channel type on {}", interface.name),
    };
    info!("[arp] listening on {}", interface.name);

    loop {
        match rx.next() {
            Ok(frame) => {
                let Some(sighting) = parse_frame(frame) else {
                    continue;
                };
                debug!(
                    "[arp] {} ({}) {}",
                    sighting.mac,
                    sighting.ip,
                    if sighting.is_request { "request" } else { "reply" }
                );
                if tx.blocking_send(sighting).is_err() {
                    warn!("[arp] publisher gone, stopping capture");
                    return Ok(());
                }
            }
            Err(e) => {
                error!("[arp] capture error: {}", e);
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}
