//! MQTT broker glue.
//!
//! Subscribes to the plant's topic tree and forwards every received message
//! into the telemetry aggregator; publishes validated command values back
//! out. Connection management is the MQTT client's own; transport errors
//! are logged and retried, never surfaced into the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hvac_model::{Component, Item, PlantValue, TOPIC_ROOT};
use hvac_pipeline::TelemetryAggregator;

/// MQTT connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker host.
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client ID (auto-generated if not provided).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Username for authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Root of the plant topic tree to subscribe under.
    #[serde(default = "default_topic_root")]
    pub topic_root: String,
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_topic_root() -> String {
    TOPIC_ROOT.to_string()
}

impl MqttSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            topic_root: default_topic_root(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn effective_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("hvac-bridge-{}", Uuid::new_v4()))
    }

    fn subscription_filter(&self) -> String {
        format!("{}/#", self.topic_root)
    }
}

/// Errors from the broker glue.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A connected MQTT bridge: one broker, one subscription covering the whole
/// plant tree, one background task pumping messages into the aggregator.
pub struct MqttBridge {
    client: rumqttc::AsyncClient,
    running: Arc<AtomicBool>,
}

impl MqttBridge {
    /// Connect, subscribe to the plant tree and start forwarding messages
    /// into `aggregator`.
    pub async fn connect(
        settings: MqttSettings,
        aggregator: Arc<TelemetryAggregator>,
    ) -> Result<Self, BridgeError> {
        let client_id = settings.effective_client_id();
        let mut options = rumqttc::MqttOptions::new(&client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(options, 10);
        client
            .subscribe(settings.subscription_filter(), rumqttc::QoS::AtLeastOnce)
            .await?;

        let running = Arc::new(AtomicBool::new(true));
        let running_flag = running.clone();
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            while running_flag.load(Ordering::SeqCst) {
                match eventloop.poll().await {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                        aggregator.ingest(&publish.topic, &publish.payload, Utc::now());
                    }
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                        info!(host = %settings.host, port = settings.port, "connected to broker");
                    }
                    Ok(event) => {
                        debug!(?event, "mqtt event");
                    }
                    Err(err) => {
                        warn!(%err, "mqtt connection error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("mqtt bridge task stopped");
        });

        info!(client_id = %client_id, "mqtt bridge started");
        Ok(Self { client, running })
    }

    /// Publish a validated command value to the item's write topic.
    ///
    /// Callers are expected to run the value through the command validator
    /// first; this method only serialises and sends.
    pub async fn publish_command(
        &self,
        component: &Component,
        item: &Item,
        value: &PlantValue,
    ) -> Result<(), BridgeError> {
        let topic = component.topic_for(item).to_topic();
        let payload = serde_json::to_vec(value)?;
        self.client
            .publish(topic, rumqttc::QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Stop the forwarding task and disconnect.
    pub async fn disconnect(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(err) = self.client.disconnect().await {
            debug!(%err, "broker already disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = MqttSettings::new("broker.local");
        assert_eq!(settings.port, 1883);
        assert_eq!(settings.keep_alive_secs, 60);
        assert_eq!(settings.subscription_filter(), "LSST/#");
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let settings = MqttSettings::new("broker.local");
        assert_ne!(settings.effective_client_id(), settings.effective_client_id());

        let fixed = MqttSettings {
            client_id: Some("bridge-1".to_string()),
            ..MqttSettings::new("broker.local")
        };
        assert_eq!(fixed.effective_client_id(), "bridge-1");
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: MqttSettings = serde_json::from_str(r#"{"host": "10.0.0.5"}"#).unwrap();
        assert_eq!(settings.host, "10.0.0.5");
        assert_eq!(settings.port, 1883);
        assert_eq!(settings.topic_root, "LSST");
    }
}
