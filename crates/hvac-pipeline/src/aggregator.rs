//! Telemetry aggregation.
//!
//! Samples arrive from the transport layer one `ingest` call per MQTT
//! message, from any number of tasks. They accumulate in per-item buffers
//! until the periodic tick reduces each non-empty buffer to a single value
//! and broadcasts it. The buffer map gives every item its own lock, so an
//! ingest for one item never contends with a tick draining another, and a
//! sample racing the drain lands in exactly one window.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use hvac_model::{ItemDirection, ModelHandle, PlantValue};

use crate::config::PipelineConfig;
use crate::reduce::{reduce, Sample};

/// Identity of a buffered item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BufferKey {
    component: String,
    item: String,
}

/// One reduced value per item per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedSample {
    pub component: String,
    pub item: String,
    pub value: PlantValue,
    pub unit: String,
    /// Closing timestamp of the tick that produced this value.
    pub closed_at: DateTime<Utc>,
}

/// Dropped-sample counters, the observability surface of the pipeline.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    unknown_topics: AtomicU64,
    bad_payloads: AtomicU64,
}

impl PipelineCounters {
    fn count_unknown_topic(&self) {
        self.unknown_topics.fetch_add(1, Ordering::Relaxed);
    }

    fn count_bad_payload(&self) {
        self.bad_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            unknown_topics: self.unknown_topics.load(Ordering::Relaxed),
            bad_payloads: self.bad_payloads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub unknown_topics: u64,
    pub bad_payloads: u64,
}

/// The telemetry aggregation pipeline.
pub struct TelemetryAggregator {
    model: Arc<ModelHandle>,
    config: PipelineConfig,
    buffers: DashMap<BufferKey, Vec<Sample>>,
    counters: PipelineCounters,
    sample_tx: broadcast::Sender<ReducedSample>,
    running: AtomicBool,
}

impl TelemetryAggregator {
    pub fn new(model: Arc<ModelHandle>, config: PipelineConfig) -> Self {
        let (sample_tx, _) = broadcast::channel(config.channel_capacity);
        Self {
            model,
            config,
            buffers: DashMap::new(),
            counters: PipelineCounters::default(),
            sample_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Subscribe to reduced samples.
    pub fn subscribe(&self) -> broadcast::Receiver<ReducedSample> {
        self.sample_tx.subscribe()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Feed one wire sample into the pipeline.
    ///
    /// Never blocks and never panics across the transport boundary: a topic
    /// the model does not know, a payload that does not coerce to the item's
    /// declared type, or a sample addressed to a command item all increment
    /// a counter and drop that one sample.
    pub fn ingest(&self, topic: &str, payload: &[u8], received_at: DateTime<Utc>) {
        let model = self.model.current();
        let Some(entry) = model.resolve(topic) else {
            self.counters.count_unknown_topic();
            debug!(topic, "dropping sample for unknown topic");
            return;
        };

        if entry.item.direction != ItemDirection::Telemetry {
            self.counters.count_bad_payload();
            debug!(topic, "dropping sample addressed to a command item");
            return;
        }

        match entry.item.data_type.coerce_payload(payload) {
            Ok(value) => {
                let key = BufferKey {
                    component: entry.component.path.clone(),
                    item: entry.item.name.clone(),
                };
                self.buffers
                    .entry(key)
                    .or_default()
                    .push(Sample::new(value, received_at));
            }
            Err(err) => {
                self.counters.count_bad_payload();
                debug!(topic, %err, "dropping undecodable payload");
            }
        }
    }

    /// Close the current window: reduce and broadcast every non-empty
    /// buffer, then leave all buffers empty. Returns the number of reduced
    /// samples emitted.
    ///
    /// Each buffer is taken in one step while its lock is held, so a
    /// concurrent `ingest` for the same item lands either in the window
    /// closing here or in the next one, never in both.
    pub fn tick(&self, closed_at: DateTime<Utc>) -> usize {
        let model = self.model.current();
        let mut emitted = 0;

        for mut slot in self.buffers.iter_mut() {
            let samples = std::mem::take(slot.value_mut());
            if samples.is_empty() {
                continue;
            }
            let key = slot.key();

            let Some(item) = model
                .component(&key.component)
                .and_then(|c| c.item(&key.item, ItemDirection::Telemetry))
            else {
                // The model was swapped and no longer knows this item; the
                // buffered window has nowhere to go.
                warn!(
                    component = %key.component,
                    item = %key.item,
                    dropped = samples.len(),
                    "discarding buffered samples for an item no longer in the model"
                );
                continue;
            };

            if let Some(value) = reduce(&item.data_type, &samples) {
                let _ = self.sample_tx.send(ReducedSample {
                    component: key.component.clone(),
                    item: key.item.clone(),
                    value,
                    unit: item.unit.clone(),
                    closed_at,
                });
                emitted += 1;
            }
        }

        debug!(emitted, "closed aggregation window");
        emitted
    }

    /// Drive the tick on the configured period until [`stop`] is called.
    ///
    /// The tick runs inline in this task and the interval delays missed
    /// ticks, so two ticks can never overlap.
    ///
    /// [`stop`]: TelemetryAggregator::stop
    pub async fn run(self: Arc<Self>) {
        let period = self.config.aggregation_period();
        self.running.store(true, Ordering::SeqCst);
        info!(period_secs = period.as_secs(), "telemetry aggregation started");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; consume it
        // so the first window spans a full period.
        interval.tick().await;

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.tick(Utc::now());
        }
        info!("telemetry aggregation stopped");
    }

    /// Ask a running [`run`] loop to exit after its current window.
    ///
    /// [`run`]: TelemetryAggregator::run
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_model::catalog::load_reader;
    use hvac_model::{build_model, TopicModel};

    fn test_model() -> TopicModel {
        let csv = "floor;subsystem;variable;topic_and_item;publication;subscription;signal;rw;range;limits;unit;state;observations;notes\n\
            PISO2;Fancoil;Temperatura Sala;LSST/PISO2/FANCOIL01/TEMPERATURA_SALA;SI;NO;SENAL ANALOGICA;READ;;10 a 30;°C;OK;;\n\
            PISO2;Fancoil;Estado Operacion;LSST/PISO2/FANCOIL01/ESTADO_OPERACION;SI;NO;MULTIESTADO;READ;ON,OFF;-;-;OK;;\n\
            PISO2;Fancoil;Comando Encendido;LSST/PISO2/FANCOIL01/COMANDO_ENCENDIDO_LSST;NO;SI;SENAL DIGITAL;WRITE;;true o false;-;OK;;\n";
        let load = load_reader(csv.as_bytes()).unwrap();
        build_model(&load.records).unwrap()
    }

    fn aggregator() -> TelemetryAggregator {
        TelemetryAggregator::new(
            Arc::new(ModelHandle::new(test_model())),
            PipelineConfig::default(),
        )
    }

    #[test]
    fn test_unknown_topic_counts_and_never_panics() {
        let agg = aggregator();
        agg.ingest("LSST/PISO02/NADIE/TEMPERATURA", b"21.0", Utc::now());
        agg.ingest("not even a topic", b"21.0", Utc::now());
        assert_eq!(agg.counters().unknown_topics, 2);
        assert_eq!(agg.counters().bad_payloads, 0);
        assert_eq!(agg.tick(Utc::now()), 0);
    }

    #[test]
    fn test_bad_payload_drops_only_that_sample() {
        let agg = aggregator();
        let topic = "LSST/PISO02/FANCOIL01/TEMPERATURA_SALA";
        agg.ingest(topic, b"21.0", Utc::now());
        agg.ingest(topic, b"not a number", Utc::now());
        agg.ingest(topic, b"23.0", Utc::now());
        assert_eq!(agg.counters().bad_payloads, 1);

        let mut rx = agg.subscribe();
        assert_eq!(agg.tick(Utc::now()), 1);
        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.value, PlantValue::Float(22.0));
    }

    #[test]
    fn test_sample_for_command_item_is_dropped() {
        let agg = aggregator();
        agg.ingest(
            "LSST/PISO02/FANCOIL01/COMANDO_ENCENDIDO_LSST",
            b"true",
            Utc::now(),
        );
        assert_eq!(agg.counters().bad_payloads, 1);
        assert_eq!(agg.tick(Utc::now()), 0);
    }

    #[test]
    fn test_tick_emits_median_and_clears() {
        let agg = aggregator();
        let topic = "LSST/PISO02/FANCOIL01/TEMPERATURA_SALA";
        for payload in [b"3.0".as_slice(), b"1.0", b"2.0"] {
            agg.ingest(topic, payload, Utc::now());
        }

        let mut rx = agg.subscribe();
        assert_eq!(agg.tick(Utc::now()), 1);
        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.value, PlantValue::Float(2.0));
        assert_eq!(sample.unit, "deg_C");

        // The window is cleared: nothing to emit until new samples arrive.
        assert_eq!(agg.tick(Utc::now()), 0);
    }

    #[test]
    fn test_enum_window_emits_most_recent_and_clears() {
        let agg = aggregator();
        let topic = "LSST/PISO02/FANCOIL01/ESTADO_OPERACION";
        for payload in [b"OFF".as_slice(), b"OFF", b"ON"] {
            agg.ingest(topic, payload, Utc::now());
        }

        let mut rx = agg.subscribe();
        assert_eq!(agg.tick(Utc::now()), 1);
        assert_eq!(rx.try_recv().unwrap().value, PlantValue::Text("ON".into()));
        assert_eq!(agg.tick(Utc::now()), 0);
    }

    #[test]
    fn test_at_most_one_emission_per_item_per_tick() {
        let agg = aggregator();
        let temperatura = "LSST/PISO02/FANCOIL01/TEMPERATURA_SALA";
        let estado = "LSST/PISO02/FANCOIL01/ESTADO_OPERACION";
        for _ in 0..20 {
            agg.ingest(temperatura, b"21.5", Utc::now());
            agg.ingest(estado, b"ON", Utc::now());
        }

        let mut rx = agg.subscribe();
        let closed_at = Utc::now();
        assert_eq!(agg.tick(closed_at), 2);

        let mut seen = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            seen.push((sample.item.clone(), sample.closed_at));
        }
        assert_eq!(seen.len(), 2);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 2, "an item emitted twice in one tick");
    }

    #[test]
    fn test_model_swap_applies_to_later_samples() {
        let handle = Arc::new(ModelHandle::new(test_model()));
        let agg = TelemetryAggregator::new(handle.clone(), PipelineConfig::default());
        let topic = "LSST/PISO02/FANCOIL01/TEMPERATURA_SALA";

        agg.ingest(topic, b"21.0", Utc::now());
        handle.replace(TopicModel::default());
        agg.ingest(topic, b"22.0", Utc::now());

        assert_eq!(agg.counters().unknown_topics, 1);
    }
}
