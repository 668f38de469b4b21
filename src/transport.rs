//! Transport adapters: the seam between external protocols and the buffer.
//!
//! An adapter owns its own connection lifecycle; [`drive`] wraps any
//! adapter in a reconnect-with-backoff loop so a flapping source never
//! crashes the pipeline. Samples arriving while a source is down are lost
//! at the source — nothing is invented or backfilled here. Adapters
//! translate their wire encoding into [`MetricRecord`] (or reject
//! untranslatable input) before anything reaches the buffer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::buffer::IngestionBuffer;
use crate::error::PipelineError;
use crate::models::{MetricRecord, RawMetricReading};

// ---

/// Exponential backoff with a cap.
///
/// `reset` after a successful connect so a stable source pays only the base
/// delay on its next hiccup.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        // ---
        let next = match self.current {
            None => self.base,
            Some(current) => (current * 2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

// ---

/// A source of metric records behind some external protocol.
#[async_trait]
pub trait TransportAdapter: Send {
    fn name(&self) -> &str;

    /// Establish or re-establish the source connection.
    async fn connect(&mut self) -> Result<(), PipelineError>;

    /// Next decoded record. `Ok(None)` means the source is finished.
    async fn next_record(&mut self) -> Result<Option<MetricRecord>, PipelineError>;
}

/// Run an adapter against the buffer until its source finishes.
///
/// Connection failures back off and reconnect. Buffer rejections are logged
/// and the sample dropped: the buffer's capacity signal is the pipeline's
/// only admission control, so a saturated buffer sheds load here, at the
/// source.
pub async fn drive(
    mut adapter: impl TransportAdapter,
    buffer: Arc<IngestionBuffer>,
    mut backoff: RetryBackoff,
) {
    // ---
    loop {
        if let Err(err) = adapter.connect().await {
            let delay = backoff.next_delay();
            warn!(adapter = adapter.name(), error = %err, "connect failed, backing off");
            tokio::time::sleep(delay).await;
            continue;
        }
        backoff.reset();
        debug!(adapter = adapter.name(), "connected");

        loop {
            match adapter.next_record().await {
                Ok(Some(record)) => {
                    if let Err(err) = buffer.submit(record).await {
                        warn!(adapter = adapter.name(), "sample dropped at source: {err}");
                    }
                }
                Ok(None) => {
                    debug!(adapter = adapter.name(), "source finished");
                    return;
                }
                Err(err) => {
                    warn!(adapter = adapter.name(), error = %err, "source error, reconnecting");
                    break;
                }
            }
        }

        let delay = backoff.next_delay();
        tokio::time::sleep(delay).await;
    }
}

// ---

/// Topic scheme used by the sensor fleet: `esg/{building_id}/data`.
pub const MQTT_TOPIC_PREFIX: &str = "esg/";
pub const MQTT_TOPIC_SUFFIX: &str = "/data";

/// Decode one MQTT publish into a record.
///
/// The broker client itself lives outside this crate; whichever client is
/// wired up feeds its `(topic, payload)` pairs through here, typically via
/// a [`ChannelAdapter`]. The building comes from the topic, the quantities
/// from the JSON payload.
pub fn decode_mqtt_payload(topic: &str, payload: &[u8]) -> Result<MetricRecord, PipelineError> {
    // ---
    let building_id = topic
        .strip_prefix(MQTT_TOPIC_PREFIX)
        .and_then(|rest| rest.strip_suffix(MQTT_TOPIC_SUFFIX))
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .ok_or_else(|| PipelineError::transport(format!("unroutable topic {topic:?}")))?;

    let raw: RawMetricReading = serde_json::from_slice(payload)
        .map_err(|e| PipelineError::transport(format!("undecodable payload on {topic:?}: {e}")))?;

    if let Some(status) = raw.sensor_status.as_deref() {
        debug!(building_id, status, "sensor status");
    }
    Ok(raw.into_record(building_id))
}

/// In-memory adapter over a channel of raw samples.
///
/// Doubles as the test double and as the hook for external protocol
/// clients: an MQTT subscriber decodes its publishes and forwards them into
/// the channel.
pub struct ChannelAdapter {
    name: String,
    rx: mpsc::Receiver<(String, RawMetricReading)>,
}

impl ChannelAdapter {
    pub fn new(name: impl Into<String>, rx: mpsc::Receiver<(String, RawMetricReading)>) -> Self {
        Self {
            name: name.into(),
            rx,
        }
    }
}

#[async_trait]
impl TransportAdapter for ChannelAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn next_record(&mut self) -> Result<Option<MetricRecord>, PipelineError> {
        // ---
        Ok(self
            .rx
            .recv()
            .await
            .map(|(building_id, raw)| raw.into_record(&building_id)))
    }
}

// ---

/// Read capability of a BACnet stack: present-value of one analog object.
///
/// The protocol engine and device discovery live outside this crate; this
/// is the narrow seam the poller needs.
#[async_trait]
pub trait PropertyReader: Send + Sync {
    async fn read_present_value(
        &self,
        device_address: &str,
        object_id: &str,
    ) -> Result<f64, PipelineError>;
}

/// Analog points mapped to one building's quantities.
#[derive(Debug, Clone)]
pub struct BacnetPointMap {
    pub building_id: String,
    pub device_address: String,
    pub co2_object: String,
    pub energy_object: String,
    pub water_object: String,
    pub waste_object: String,
}

/// Polls each configured building's analog points on a fixed interval.
///
/// A failed property read surfaces as a transport error, which sends the
/// poller through the reconnect/backoff path of [`drive`]; readings missed
/// during the outage are simply gone.
pub struct BacnetPoller<R> {
    reader: R,
    points: Vec<BacnetPointMap>,
    poll_interval: Duration,
    cursor: usize,
}

impl<R> BacnetPoller<R> {
    pub fn new(reader: R, points: Vec<BacnetPointMap>, poll_interval: Duration) -> Self {
        // ---
        Self {
            reader,
            points,
            poll_interval,
            cursor: 0,
        }
    }
}

#[async_trait]
impl<R: PropertyReader> TransportAdapter for BacnetPoller<R> {
    fn name(&self) -> &str {
        "bacnet"
    }

    async fn connect(&mut self) -> Result<(), PipelineError> {
        // The reader owns broker/device connectivity; a poller restart just
        // resumes the point cycle.
        self.cursor = 0;
        Ok(())
    }

    async fn next_record(&mut self) -> Result<Option<MetricRecord>, PipelineError> {
        // ---
        if self.points.is_empty() {
            return Ok(None);
        }
        if self.cursor >= self.points.len() {
            tokio::time::sleep(self.poll_interval).await;
            self.cursor = 0;
        }

        let point = &self.points[self.cursor];
        let record = MetricRecord {
            building_id: point.building_id.clone(),
            timestamp: Utc::now(),
            co2_kg: self
                .reader
                .read_present_value(&point.device_address, &point.co2_object)
                .await?,
            energy_kwh: self
                .reader
                .read_present_value(&point.device_address, &point.energy_object)
                .await?,
            water_m3: self
                .reader
                .read_present_value(&point.device_address, &point.water_object)
                .await?,
            waste_kg: self
                .reader
                .read_present_value(&point.device_address, &point.waste_object)
                .await?,
        };
        self.cursor += 1;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{DateTime, TimeZone};

    #[test]
    fn test_backoff_doubles_to_cap_and_resets() {
        // ---
        let mut backoff = RetryBackoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_decode_mqtt_payload() {
        // ---
        let payload = br#"{
            "timestamp": "2024-06-01T12:00:00Z",
            "co2_kg": 1200.5,
            "energy_kwh": 5000.0,
            "water_m3": 200.0,
            "waste_kg": 150.0,
            "sensor_status": "normal"
        }"#;

        let record = decode_mqtt_payload("esg/bld-001/data", payload).unwrap();
        assert_eq!(record.building_id, "bld-001");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(record.co2_kg, 1200.5);
        assert_eq!(record.waste_kg, 150.0);
    }

    #[test]
    fn test_decode_rejects_unroutable_topics() {
        // ---
        let payload = br#"{"co2_kg":1,"energy_kwh":1,"water_m3":1,"waste_kg":1,"timestamp":null}"#;

        for topic in [
            "esg/bld-001/command",
            "esg//data",
            "other/bld-001/data",
            "esg/a/b/data",
        ] {
            let err = decode_mqtt_payload(topic, payload).unwrap_err();
            assert!(matches!(err, PipelineError::Transport(_)), "topic {topic}");
        }
    }

    #[test]
    fn test_decode_rejects_undecodable_payloads() {
        // ---
        let err = decode_mqtt_payload("esg/bld-001/data", b"not json").unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));

        // Missing quantity fields are untranslatable, not defaulted
        let err = decode_mqtt_payload("esg/bld-001/data", br#"{"co2_kg": 1.0}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    struct FixedReader;

    #[async_trait]
    impl PropertyReader for FixedReader {
        async fn read_present_value(
            &self,
            _device_address: &str,
            object_id: &str,
        ) -> Result<f64, PipelineError> {
            // ---
            match object_id {
                "analog-value,1" => Ok(1200.0),
                "analog-value,2" => Ok(5000.0),
                "analog-value,3" => Ok(200.0),
                "analog-value,4" => Ok(150.0),
                other => Err(PipelineError::transport(format!("unknown object {other}"))),
            }
        }
    }

    #[tokio::test]
    async fn test_bacnet_poller_maps_points_to_quantities() {
        // ---
        let points = vec![BacnetPointMap {
            building_id: "bld-001".to_string(),
            device_address: "192.168.1.100".to_string(),
            co2_object: "analog-value,1".to_string(),
            energy_object: "analog-value,2".to_string(),
            water_object: "analog-value,3".to_string(),
            waste_object: "analog-value,4".to_string(),
        }];
        let mut poller = BacnetPoller::new(FixedReader, points, Duration::from_millis(1));

        poller.connect().await.unwrap();
        let before: DateTime<Utc> = Utc::now();
        let record = poller.next_record().await.unwrap().unwrap();

        assert_eq!(record.building_id, "bld-001");
        assert_eq!(record.co2_kg, 1200.0);
        assert_eq!(record.energy_kwh, 5000.0);
        assert_eq!(record.water_m3, 200.0);
        assert_eq!(record.waste_kg, 150.0);
        assert!(record.timestamp >= before);
    }
}
