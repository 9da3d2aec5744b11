//! Plant simulator.
//!
//! Fabricates plausible telemetry for every telemetry item in the model:
//! numerics uniformly inside their declared limits, booleans flipping
//! occasionally, enumerations cycling through their options. Used by the
//! CLI's simulation mode and by integration tests, in place of a live
//! broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use hvac_model::{DataType, Item, ModelHandle};
use hvac_pipeline::TelemetryAggregator;

/// Fallback span for numeric items whose catalog row declared no limits.
const DEFAULT_SPAN: (f64, f64) = (0.0, 100.0);

/// Telemetry generator over a plant model.
pub struct SimPlant {
    model: Arc<ModelHandle>,
}

impl SimPlant {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self { model }
    }

    /// One fabricated wire sample for every telemetry item in the model.
    pub fn sample_all(&self) -> Vec<(String, Vec<u8>)> {
        let model = self.model.current();
        let mut rng = rand::thread_rng();
        let mut samples = Vec::new();
        for component in model.components() {
            for item in component.telemetry.values() {
                let payload = fabricate(&mut rng, item);
                let topic = component.topic_for(item).to_topic();
                samples.push((topic, payload));
            }
        }
        samples
    }

    /// Feed fabricated samples into `aggregator` every `period` until the
    /// `running` flag clears.
    pub async fn run(
        self,
        aggregator: Arc<TelemetryAggregator>,
        period: Duration,
        running: Arc<AtomicBool>,
    ) {
        info!(period_ms = period.as_millis() as u64, "plant simulator started");
        while running.load(Ordering::SeqCst) {
            let samples = self.sample_all();
            debug!(count = samples.len(), "publishing fabricated samples");
            for (topic, payload) in samples {
                aggregator.ingest(&topic, &payload, Utc::now());
            }
            tokio::time::sleep(period).await;
        }
        info!("plant simulator stopped");
    }
}

fn fabricate(rng: &mut impl Rng, item: &Item) -> Vec<u8> {
    match &item.data_type {
        DataType::Boolean => {
            let value: bool = rng.gen_bool(0.8);
            value.to_string().into_bytes()
        }
        DataType::Integer => {
            let (lower, upper) = numeric_span(item);
            let value = rng.gen_range(lower as i64..=upper as i64);
            value.to_string().into_bytes()
        }
        DataType::Float => {
            let (lower, upper) = numeric_span(item);
            let value = rng.gen_range(lower..=upper);
            format!("{value:.1}").into_bytes()
        }
        DataType::Enum { options } if !options.is_empty() => {
            let index = rng.gen_range(0..options.len());
            options[index].clone().into_bytes()
        }
        DataType::Enum { .. } | DataType::Text => b"OK".to_vec(),
    }
}

fn numeric_span(item: &Item) -> (f64, f64) {
    item.limits
        .map(|limits| (limits.lower, limits.upper))
        .unwrap_or(DEFAULT_SPAN)
}
