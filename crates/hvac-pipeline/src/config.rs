//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the telemetry aggregation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seconds between aggregation ticks.
    #[serde(default = "default_aggregation_period_secs")]
    pub aggregation_period_secs: u64,

    /// Capacity of the reduced-sample broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_aggregation_period_secs() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    1000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aggregation_period_secs: default_aggregation_period_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl PipelineConfig {
    pub fn with_period_secs(mut self, secs: u64) -> Self {
        self.aggregation_period_secs = secs;
        self
    }

    pub fn aggregation_period(&self) -> Duration {
        Duration::from_secs(self.aggregation_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.aggregation_period(), Duration::from_secs(60));
        assert_eq!(config.channel_capacity, 1000);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.aggregation_period_secs, 60);
        let config: PipelineConfig =
            serde_json::from_str(r#"{"aggregation_period_secs": 5}"#).unwrap();
        assert_eq!(config.aggregation_period(), Duration::from_secs(5));
    }
}
