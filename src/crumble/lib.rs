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

//! Read temperature and humidity from one or more DHT22 sensors.
//!
//! ## Features
//!
//! Crumble reads temperature and humidity information from [DHT22 sensors](https://learn.adafruit.com/dht)
//! connected to the GPIO pins of a Raspberry PI by bit-banging the sensor's one-wire protocol.
//! Sensors are read one after another, each read is retried a configurable number of times,
//! and the results are printed as text or JSON. Crumble can also run in the background and
//! export the readings as Prometheus metrics.
//!
//! The following metrics are exported when running with `--serve`, each labeled with the `pin`
//! and `name` of the sensor as well as its position (`sensor`, starting at 1) on the command line:
//!
//! * `crumble_temperature_degrees` - Degrees celsius measured by the sensor.
//! * `crumble_relative_humidity` - Relative humidity (from 0 to 100) measured by the sensor.
//! * `crumble_last_read_timestamp` - UNIX timestamp of the last time the sensor was correctly read.
//! * `crumble_attempts_total` - Total number of attempts to read the sensor.
//! * `crumble_errors_total` - Total sensors that could not be read, by type of the final error.
//!
//! ## Build
//!
//! `crumble` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//! Since it's meant to be run on a Raspberry PI, you will also likely need to cross-compile it.
//!
//! ```text
//! rustup target add armv7-unknown-linux-musleabihf
//! cargo build --release --target armv7-unknown-linux-musleabihf
//! ```
//!
//! ## Run
//!
//! In order to read and write the device `/dev/gpiomem` and to switch to real-time scheduling
//! while reading, `crumble` should run as `root`. Without real-time scheduling reads still work
//! but are more likely to fail with timeouts or invalid pulse widths on a busy machine.
//!
//! ```text
//! sudo crumble --sensor 4:garage --sensor 17:bedroom --attempts 3
//! sudo crumble --sensor 4 --format json
//! sudo crumble --sensor 4:garage --serve --refresh-secs 60
//! ```
//!
//! **NOTE**: The DHT22 sensor can only be read every two seconds, at most. Failed reads are
//! retried after a two second delay.
//!

pub mod batch;
pub mod http;
pub mod metrics;
pub mod output;
pub mod sensor;
