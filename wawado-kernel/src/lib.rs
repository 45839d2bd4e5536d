//! WaWaDo kernel - network watchdog forwarding events through a chat bridge
//!
//! Two independent activities share one alert sink:
//! - host liveness polling (`hosts`, `probe`, `watchdog`), controlled by chat
//!   commands (`dispatch`)
//! - device presence from ARP reports (`presence`)
//!
//! The chat itself lives behind an MQTT bridge (`transport`, `ack`).

pub mod ack;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hosts;
pub mod models;
pub mod presence;
pub mod probe;
pub mod sink;
pub mod state;
pub mod transport;
pub mod watchdog;

pub use error::{Result, WatchdogError};
pub use sink::AlertSink;
