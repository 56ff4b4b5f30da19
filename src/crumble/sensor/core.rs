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

use std::error::Error;
use std::fmt::{self, Formatter};

/// Temperature, in degrees celsius
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct TemperatureCelsius(f64);

impl From<TemperatureCelsius> for f64 {
    fn from(v: TemperatureCelsius) -> Self {
        v.0
    }
}

impl From<f64> for TemperatureCelsius {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for TemperatureCelsius {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}c", self.0)
    }
}

/// Relative humidity (from 0 to 100)
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct Humidity(f64);

impl From<Humidity> for f64 {
    fn from(v: Humidity) -> Self {
        v.0
    }
}

impl From<f64> for Humidity {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Humidity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Temperature and humidity decoded from a single valid sensor frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub temperature: TemperatureCelsius,
    pub humidity: Humidity,
}

/// Potential kinds of errors that can be encountered reading from a DHT sensor
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum SensorErrorKind {
    Initialization,
    Timeout,
    InvalidPulseWidth,
    Checksum,
}

impl SensorErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            SensorErrorKind::Initialization => "initialization",
            SensorErrorKind::Timeout => "timeout",
            SensorErrorKind::InvalidPulseWidth => "invalid_pulse_width",
            SensorErrorKind::Checksum => "checksum",
        }
    }
}

/// Error initializing or reading a DHT22 sensor via a GPIO pin
#[derive(Debug)]
pub enum SensorError {
    /// Checksum byte sent by the sensor and the checksum computed from the data
    CheckSum(u8, u8),
    /// Index of the bit and the duration of its high pulse, in microseconds
    PulseWidth(usize, u32),
    KindMsg(SensorErrorKind, &'static str),
    KindMsgCause(SensorErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl SensorError {
    pub fn kind(&self) -> SensorErrorKind {
        match self {
            SensorError::CheckSum(_, _) => SensorErrorKind::Checksum,
            SensorError::PulseWidth(_, _) => SensorErrorKind::InvalidPulseWidth,
            SensorError::KindMsg(kind, _) => *kind,
            SensorError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::CheckSum(expected, got) => {
                write!(f, "checksum error: expected {}, got {}", expected, got)
            }
            SensorError::PulseWidth(bit, micros) => {
                write!(f, "invalid pulse width for bit {}: {}us", bit, micros)
            }
            SensorError::KindMsg(_, msg) => msg.fmt(f),
            SensorError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for SensorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SensorError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Logic level of a GPIO pin.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Level {
    Low,
    High,
}

/// Whether a GPIO pin is being driven by us or read from.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Direction {
    Input,
    Output,
}

/// Capabilities of the GPIO controller needed to talk to DHT22 sensors.
///
/// Pins are identified by their BCM GPIO number. The microsecond counter is
/// free-running and wraps at `u32::MAX`, callers must compare two readings of
/// it using `wrapping_sub` and never by ordering them directly.
pub trait GpioPort {
    fn set_direction(&mut self, pin: u8, direction: Direction);
    fn write(&mut self, pin: u8, level: Level);
    fn read(&self, pin: u8) -> Level;
    fn now_micros(&self) -> u32;
    fn delay_millis(&mut self, ms: u32);
}

/// Something that can make a single attempt at reading a sensor.
///
/// Implementations must not retry: one call to `read` is one physical
/// transaction with the sensor. Waiting between attempts is done by callers
/// via `wait_millis` so that all timing goes through the same clock.
pub trait ReadSensor {
    fn read(&mut self, pin: u8) -> Result<Measurement, SensorError>;
    fn wait_millis(&mut self, ms: u32);
}
