// Crumble - Temperature and humidity readings from DHT22 sensors
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::batch::{ReadStatus, Sensor};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::error::Error;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const SENSOR_LABELS: &[&str] = &["sensor", "pin", "name"];
const ERROR_LABELS: &[&str] = &["sensor", "pin", "name", "kind"];

/// Collection of Prometheus metrics updated based on DHT22 sensor temperature and
/// humidity readings, labeled by the position, pin, and name of each sensor.
///
/// The position (starting at 1, in the order sensors were configured) keeps the
/// series of sensors that share a pin and name separate.
pub struct TemperatureMetrics {
    temperature: GaugeVec,
    humidity: GaugeVec,
    last_reading: GaugeVec,
    attempts: CounterVec,
    errors: CounterVec,
}

impl TemperatureMetrics {
    pub fn new(reg: &Registry) -> Result<Self, prometheus::Error> {
        let temperature = GaugeVec::new(
            Opts::new("crumble_temperature_degrees", "Temperature in celsius"),
            SENSOR_LABELS,
        )?;
        let humidity = GaugeVec::new(
            Opts::new("crumble_relative_humidity", "Relative humidity (0-100)"),
            SENSOR_LABELS,
        )?;
        let last_reading = GaugeVec::new(
            Opts::new("crumble_last_read_timestamp", "Timestamp of last successful read"),
            SENSOR_LABELS,
        )?;
        let attempts = CounterVec::new(
            Opts::new("crumble_attempts_total", "Number of attempted reads"),
            SENSOR_LABELS,
        )?;
        let errors = CounterVec::new(
            Opts::new("crumble_errors_total", "Number of sensors that could not be read, by type"),
            ERROR_LABELS,
        )?;

        reg.register(Box::new(temperature.clone()))?;
        reg.register(Box::new(humidity.clone()))?;
        reg.register(Box::new(last_reading.clone()))?;
        reg.register(Box::new(attempts.clone()))?;
        reg.register(Box::new(errors.clone()))?;

        Ok(Self {
            temperature,
            humidity,
            last_reading,
            attempts,
            errors,
        })
    }

    /// Update metrics from the sensors after a batch of reads. Sensors that weren't
    /// read successfully keep their previous temperature and humidity values.
    pub fn update(&self, sensors: &[Sensor]) {
        for (i, sensor) in sensors.iter().enumerate() {
            let position = (i + 1).to_string();
            let pin = sensor.pin().to_string();
            let name = sensor.name().unwrap_or("");
            let labels = [position.as_str(), pin.as_str(), name];

            self.attempts
                .with_label_values(&labels)
                .inc_by(sensor.attempts() as f64);

            match (sensor.status(), sensor.measurement()) {
                (ReadStatus::Ok, Some(m)) => {
                    self.temperature.with_label_values(&labels).set(m.temperature.into());
                    self.humidity.with_label_values(&labels).set(m.humidity.into());

                    // If we can't get the number of seconds since the epoch, skip the update
                    let _ = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| self.last_reading.with_label_values(&labels).set(d.as_secs_f64()));
                }
                (ReadStatus::Unread, _) => {}
                (status, _) => {
                    self.errors
                        .with_label_values(&[position.as_str(), pin.as_str(), name, status.as_label()])
                        .inc();
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum ExpositionError {
    Encoding(&'static str, Box<dyn Error + Send + Sync + 'static>),
}

impl fmt::Display for ExpositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpositionError::Encoding(msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for ExpositionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExpositionError::Encoding(_, ref e) => Some(e.as_ref()),
        }
    }
}

#[derive(Debug)]
pub struct MetricsExposition {
    registry: Registry,
}

impl MetricsExposition {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Encode all metrics in the registry in the Prometheus text exposition format.
    ///
    /// Sensors are read in the background, so unlike reading them in response to a
    /// scrape, gathering here never blocks on a GPIO pin.
    pub fn encoded_text(&self) -> Result<Vec<u8>, ExpositionError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        tracing::debug!(
            message = "encoding metric families to text exposition format",
            num_metrics = metric_families.len()
        );

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ExpositionError::Encoding("unable to encode Prometheus metrics", Box::new(e)))
            .map(|_| buffer)
    }
}
