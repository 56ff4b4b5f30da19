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
use serde::Serialize;
use std::io::{self, Write};

/// Serializable view of a sensor after a batch of reads.
#[derive(Debug, Serialize, PartialEq)]
pub struct SensorReport<'a> {
    pub pin: u8,
    pub name: Option<&'a str>,
    pub status: &'static str,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub attempts: u32,
}

impl<'a> From<&'a Sensor> for SensorReport<'a> {
    fn from(s: &'a Sensor) -> Self {
        SensorReport {
            pin: s.pin(),
            name: s.name(),
            status: s.status().as_label(),
            temperature: s.temperature().map(f64::from),
            humidity: s.humidity().map(f64::from),
            attempts: s.attempts(),
        }
    }
}

/// Write one line per sensor, in the order given.
pub fn write_human<W: Write>(out: &mut W, sensors: &[Sensor]) -> io::Result<()> {
    for (i, s) in sensors.iter().enumerate() {
        let label = match s.name() {
            Some(n) => n.to_owned(),
            None => (i + 1).to_string(),
        };

        match (s.status(), s.measurement()) {
            (ReadStatus::Ok, Some(m)) => writeln!(
                out,
                "Sensor {} (pin {}): Temp: {:.1} *C, humidity: {:.1} %RH",
                label,
                s.pin(),
                f64::from(m.temperature),
                f64::from(m.humidity),
            )?,
            (status, _) => writeln!(
                out,
                "Sensor {} (pin {}): read failed: {} after {} attempts",
                label,
                s.pin(),
                status.as_label(),
                s.attempts(),
            )?,
        }
    }

    Ok(())
}

/// Write all sensors as a single JSON array, in the order given.
pub fn write_json<W: Write>(out: &mut W, sensors: &[Sensor]) -> io::Result<()> {
    let reports: Vec<SensorReport> = sensors.iter().map(SensorReport::from).collect();
    serde_json::to_writer_pretty(&mut *out, &reports)?;
    writeln!(out)
}
