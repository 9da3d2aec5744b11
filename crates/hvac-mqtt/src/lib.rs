//! MQTT transport glue and plant simulator for the HVAC bridge.
//!
//! - **client**: broker connection, the plant-tree subscription feeding the
//!   telemetry aggregator, and validated command publication
//! - **sim**: fabricated telemetry over a model, for demos and tests

pub mod client;
pub mod sim;

pub use client::{BridgeError, MqttBridge, MqttSettings};
pub use sim::SimPlant;
