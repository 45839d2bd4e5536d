//! Chat bridge over MQTT.
//!
//! The kernel does not speak any chat protocol itself. It publishes outbound
//! messages for a bridge to deliver, receives the bridge's inbound messages
//! and delivery acks, and receives hardware addresses from the ARP plugin:
//!
//! - `wawado/chat/outbound@v1`   kernel -> bridge   `ChatMessage`
//! - `wawado/chat/inbound@v1`    bridge -> kernel   `InboundMessage`
//! - `wawado/chat/ack@v1`        bridge -> kernel   `AckReceipt`
//! - `wawado/presence/observed@v1` plugin -> kernel `PresenceEvent`

use crate::ack::AckTracker;
use crate::config::{ClientConfig, MqttConf};
use crate::error::{Result, WatchdogError};
use crate::sink::AlertSink;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const OUTBOUND_TOPIC: &str = "wawado/chat/outbound@v1";
pub const INBOUND_TOPIC: &str = "wawado/chat/inbound@v1";
pub const ACK_TOPIC: &str = "wawado/chat/ack@v1";
pub const PRESENCE_TOPIC: &str = "wawado/presence/observed@v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub to: String,
    pub body: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckReceipt {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceEvent {
    pub mac: String,
    pub ip: Option<String>,
    pub ts: Option<String>,
}

/// Messages the kernel has to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Inbound(InboundMessage),
    Presence(PresenceEvent),
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Decodes one publish. Acks are resolved in place; inbound chat and
/// presence reports are returned for the caller to dispatch.
pub fn route_publish(topic: &str, payload: &[u8], acks: &AckTracker) -> Option<BusEvent> {
    match topic {
        ACK_TOPIC => {
            match serde_json::from_slice::<AckReceipt>(payload) {
                Ok(receipt) => {
                    acks.complete(&receipt.id);
                }
                Err(e) => warn!("[chat] invalid ack payload: {}", e),
            }
            None
        }
        INBOUND_TOPIC => match serde_json::from_slice::<InboundMessage>(payload) {
            Ok(msg) => Some(BusEvent::Inbound(msg)),
            Err(e) => {
                warn!("[chat] invalid inbound payload: {}", e);
                None
            }
        },
        PRESENCE_TOPIC => match serde_json::from_slice::<PresenceEvent>(payload) {
            Ok(event) => Some(BusEvent::Presence(event)),
            Err(e) => {
                debug!("[chat] invalid presence payload: {}", e);
                None
            }
        },
        _ => None,
    }
}

pub struct MqttChat {
    client: AsyncClient,
    receiver: String,
    acks: AckTracker,
    ack_timeout: Duration,
}

impl MqttChat {
    /// Builds the client; nothing happens on the wire until the returned
    /// event loop is polled (see `spawn_event_loop`).
    pub fn connect(mqtt: &MqttConf, client: &ClientConfig, ack_timeout: Duration) -> (Self, EventLoop) {
        let mut opts = MqttOptions::new(format!("wawado-{}", client.phone), &mqtt.host, mqtt.port);
        opts.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
        opts.set_clean_session(true);
        opts.set_credentials(&client.phone, &client.password);

        let (client_handle, eventloop) = AsyncClient::new(opts, 10);
        let chat = Self {
            client: client_handle,
            receiver: client.receiver.clone(),
            acks: AckTracker::new(),
            ack_timeout,
        };
        (chat, eventloop)
    }

    pub fn acks(&self) -> &AckTracker {
        &self.acks
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }

    /// Publishes `body` for `to` and waits for the bridge's ack
    pub async fn send_to(&self, to: &str, body: &str) -> Result<Uuid> {
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            to: to.to_string(),
            body: body.to_string(),
            ts: now_rfc3339(),
        };
        let payload = serde_json::to_vec(&msg)?;
        let acked = self.acks.register(msg.id);

        if let Err(e) = self.client.publish(OUTBOUND_TOPIC, QoS::AtLeastOnce, false, payload).await {
            self.acks.forget(&msg.id);
            return Err(e.into());
        }
        debug!("[chat] sent {} to {}", msg.id, to);

        match tokio::time::timeout(self.ack_timeout, acked).await {
            Ok(Ok(())) => Ok(msg.id),
            Ok(Err(_)) => Err(WatchdogError::Transport(format!("ack for {} was dropped", msg.id))),
            Err(_) => {
                self.acks.forget(&msg.id);
                Err(WatchdogError::AckTimeout { id: msg.id })
            }
        }
    }
}

impl AlertSink for MqttChat {
    async fn send(&self, message: &str) -> Result<()> {
        self.send_to(&self.receiver, message).await.map(|_| ())
    }
}

/// Polls the MQTT event loop forever: subscribes on every (re)connection,
/// resolves acks and forwards inbound chat and presence events.
pub fn spawn_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    acks: AckTracker,
    events: mpsc::Sender<BusEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("[chat] connected to broker");
                    for topic in [INBOUND_TOPIC, ACK_TOPIC, PRESENCE_TOPIC] {
                        if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
                            error!("[chat] subscribe {} failed: {:?}", topic, e);
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    if let Some(event) = route_publish(&p.topic, &p.payload, &acks) {
                        if events.send(event).await.is_err() {
                            debug!("[chat] no consumer left, dropping event");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[chat] MQTT error: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
