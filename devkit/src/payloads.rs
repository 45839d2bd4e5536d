/*!
Bus payload builders

Produce the JSON the chat bridge and the ARP plugin put on the wire, so
routing can be tested with realistic bytes (including broken ones).
*/

use anyhow::Result;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;
use wawado_kernel::transport::{ACK_TOPIC, INBOUND_TOPIC, PRESENCE_TOPIC};

#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    topic: &'static str,
    fields: Map<String, Value>,
}

impl PayloadBuilder {
    /// Chat message from `from` as relayed by the bridge
    pub fn inbound(from: &str, body: &str) -> Self {
        Self::on(INBOUND_TOPIC)
            .set_string("from", from)
            .set_string("body", body)
    }

    /// Delivery receipt for an outbound message
    pub fn ack(id: Uuid) -> Self {
        Self::on(ACK_TOPIC).set_string("id", id.to_string())
    }

    /// Address observed by the ARP plugin
    pub fn presence(mac: &str) -> Self {
        Self::on(PRESENCE_TOPIC).set_string("mac", mac)
    }

    fn on(topic: &'static str) -> Self {
        Self { topic, fields: Map::new() }
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    pub fn set_field<S: Into<String>>(mut self, field: S, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn set_string<S: Into<String>, V: Into<String>>(self, field: S, value: V) -> Self {
        self.set_field(field, Value::String(value.into()))
    }

    pub fn remove(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    pub fn with_timestamp(self) -> Self {
        let ts = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        self.set_string("ts", ts)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_payload() {
        let payload = PayloadBuilder::presence("78:E1:03:49:AD:C6")
            .set_string("ip", "192.168.1.23")
            .with_timestamp();
        let value = payload.to_value();
        assert_eq!(payload.topic(), PRESENCE_TOPIC);
        assert_eq!(value["mac"], "78:E1:03:49:AD:C6");
        assert_eq!(value["ip"], "192.168.1.23");
        assert!(value["ts"].is_string());
    }

    #[test]
    fn test_removing_required_field() {
        let value = PayloadBuilder::inbound("491707654321", "stop").remove("body").to_value();
        assert!(value.get("body").is_none());
        assert_eq!(value["from"], "491707654321");
    }
}
