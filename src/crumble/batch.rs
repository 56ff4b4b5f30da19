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

use crate::sensor::{Humidity, Measurement, ReadSensor, SensorError, SensorErrorKind, TemperatureCelsius};
use std::fmt::{self, Debug, Formatter};
use std::num::NonZeroU32;
use std::str::FromStr;

/// How long to wait between attempts at reading the same sensor. The DHT22 can
/// only be read every two seconds at most.
pub const RETRY_DELAY_MILLIS: u32 = 2_000;

pub const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(2) {
    Some(n) => n,
    None => panic!("default attempts must be non-zero"),
};

/// Pin (and optional name) of a sensor, parsed from `PIN` or `PIN:NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub pin: u8,
    pub name: Option<String>,
}

impl FromStr for SensorConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pin, name) = match s.split_once(':') {
            Some((pin, name)) => (pin, Some(name)),
            None => (s, None),
        };

        let pin = pin
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("invalid BCM GPIO pin '{}': {}", pin, e))?;
        if pin == 0 {
            return Err("BCM GPIO pin must be a positive number".to_owned());
        }

        let name = match name.map(str::trim) {
            Some("") => return Err(format!("empty sensor name for pin {}", pin)),
            Some(n) => Some(n.to_owned()),
            None => None,
        };

        Ok(SensorConfig { pin, name })
    }
}

impl fmt::Display for SensorConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(n) => write!(f, "{}:{}", self.pin, n),
            None => write!(f, "{}", self.pin),
        }
    }
}

/// Outcome of the most recent attempt at reading a sensor.
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum ReadStatus {
    Unread,
    Ok,
    Initialization,
    Timeout,
    InvalidPulseWidth,
    ChecksumMismatch,
}

impl ReadStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            ReadStatus::Unread => "unread",
            ReadStatus::Ok => "ok",
            ReadStatus::Initialization => SensorErrorKind::Initialization.as_label(),
            ReadStatus::Timeout => SensorErrorKind::Timeout.as_label(),
            ReadStatus::InvalidPulseWidth => SensorErrorKind::InvalidPulseWidth.as_label(),
            ReadStatus::ChecksumMismatch => SensorErrorKind::Checksum.as_label(),
        }
    }
}

impl From<&SensorError> for ReadStatus {
    fn from(e: &SensorError) -> Self {
        match e.kind() {
            SensorErrorKind::Initialization => ReadStatus::Initialization,
            SensorErrorKind::Timeout => ReadStatus::Timeout,
            SensorErrorKind::InvalidPulseWidth => ReadStatus::InvalidPulseWidth,
            SensorErrorKind::Checksum => ReadStatus::ChecksumMismatch,
        }
    }
}

/// A sensor and the result of the most recent batch that read it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    config: SensorConfig,
    status: ReadStatus,
    measurement: Option<Measurement>,
    attempts: u32,
}

impl Sensor {
    pub fn new(config: SensorConfig) -> Self {
        Sensor {
            config,
            status: ReadStatus::Unread,
            measurement: None,
            attempts: 0,
        }
    }

    pub fn pin(&self) -> u8 {
        self.config.pin
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn status(&self) -> ReadStatus {
        self.status
    }

    /// Number of attempts made reading this sensor during the last batch.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn measurement(&self) -> Option<Measurement> {
        self.measurement
    }

    pub fn temperature(&self) -> Option<TemperatureCelsius> {
        self.measurement.map(|m| m.temperature)
    }

    pub fn humidity(&self) -> Option<Humidity> {
        self.measurement.map(|m| m.humidity)
    }

    fn record(&mut self, res: &Result<Measurement, SensorError>) {
        self.attempts += 1;
        match res {
            Ok(m) => {
                self.status = ReadStatus::Ok;
                self.measurement = Some(*m);
            }
            Err(e) => {
                self.status = ReadStatus::from(e);
                self.measurement = None;
            }
        }
    }
}

/// Counts of how a batch of reads went.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub ok: usize,
    pub failed: usize,
    pub attempts: u32,
}

/// Read a set of sensors one after another, retrying failed reads.
pub struct BatchController {
    reader: Box<dyn ReadSensor + Send + 'static>,
    max_attempts: NonZeroU32,
}

impl BatchController {
    pub fn new<R>(reader: R, max_attempts: NonZeroU32) -> Self
    where
        R: ReadSensor + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            max_attempts,
        }
    }

    /// Read each sensor, in order, updating it with the outcome of its last attempt.
    ///
    /// Each sensor is attempted up to `max_attempts` times, stopping at the first
    /// successful read. Failed attempts are followed by a fixed delay before the next
    /// attempt (but not after the final attempt). Sensors are never read concurrently.
    pub fn run(&mut self, sensors: &mut [Sensor]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for sensor in sensors.iter_mut() {
            self.read_sensor(sensor);

            summary.attempts += sensor.attempts;
            if sensor.status == ReadStatus::Ok {
                summary.ok += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::debug!(
            message = "finished reading sensors",
            ok = summary.ok,
            failed = summary.failed,
            attempts = summary.attempts
        );

        summary
    }

    fn read_sensor(&mut self, sensor: &mut Sensor) {
        let max_attempts = self.max_attempts.get();
        sensor.attempts = 0;

        for attempt in 1..=max_attempts {
            let res = self.reader.read(sensor.pin());
            sensor.record(&res);

            match res {
                Ok(m) => {
                    tracing::info!(
                        message = "read sensor",
                        pin = sensor.pin(),
                        attempt = attempt,
                        temperature = %m.temperature,
                        humidity = %m.humidity
                    );
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    tracing::debug!(message = "sensor read failed, retrying", pin = sensor.pin(), attempt = attempt, error = %e);
                    self.reader.wait_millis(RETRY_DELAY_MILLIS);
                }
                Err(e) => {
                    tracing::warn!(message = "unable to read sensor", pin = sensor.pin(), attempts = attempt, error = %e);
                }
            }
        }
    }
}

impl Debug for BatchController {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchController")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
