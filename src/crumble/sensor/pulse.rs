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

use crate::sensor::core::{Direction, GpioPort, Level, SensorError, SensorErrorKind};
use crate::sensor::priority::{with_elevated_priority, Scheduler};

pub(crate) const DATA_BITS: usize = 40;

/// Longest we'll wait for the pin to change state during any phase of a read.
pub(crate) const WATCHDOG_MICROS: u32 = 100;

/// How long the pin is held low to wake the sensor up.
pub(crate) const START_LOW_MILLIS: u32 = 2;

/// Durations, in microseconds, that the data pin spent high for each of the 40
/// bits sent by the sensor.
///
/// Short high pulses are zeros and long high pulses are ones. Interpreting them
/// is left to the frame decoder, this only measures them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pulses {
    durations: [u32; DATA_BITS],
}

impl Pulses {
    #[cfg(test)]
    pub(crate) fn from_durations(durations: [u32; DATA_BITS]) -> Self {
        Self { durations }
    }

    /// Send the start signal to the sensor on the given pin and measure the 40
    /// high pulses it responds with.
    ///
    /// The entire exchange runs with elevated scheduling priority (if the scheduler
    /// allows it) since the difference between a zero and a one is only ~40us. An
    /// error will be returned if the pin didn't transition in time during any phase
    /// of the exchange. The read will have to be retried in this case.
    pub(crate) fn sample(port: &mut dyn GpioPort, scheduler: &dyn Scheduler, pin: u8) -> Result<Self, SensorError> {
        let res = with_elevated_priority(scheduler, || Self::sample_with_priority(port, pin));

        match &res {
            Ok(p) => tracing::trace!(message = "reading high pulse durations", pin = pin, durations = ?p.durations),
            Err(e) => tracing::debug!(message = "pulse capture aborted", pin = pin, error = %e),
        }

        res
    }

    fn sample_with_priority(port: &mut dyn GpioPort, pin: u8) -> Result<Self, SensorError> {
        // https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
        // Host needs to set the sensor:
        // * low for at least 1ms to ensure the sensor detected the start of this process
        // * high, then release the line and wait for the sensor's response
        port.set_direction(pin, Direction::Output);
        port.write(pin, Level::Low);
        port.delay_millis(START_LOW_MILLIS);
        port.write(pin, Level::High);
        port.set_direction(pin, Direction::Input);

        // The sensor responds by pulling the line low 20-40us after we release it,
        // holding it low for 80us, then high for 80us before the first bit.
        wait_while(port, pin, Level::High, "timeout waiting for sensor response")?;
        wait_while(port, pin, Level::Low, "timeout waiting for sensor response to end")?;
        wait_while(port, pin, Level::High, "timeout waiting for start of data")?;

        // Each bit is a ~50us low followed by a high whose length encodes the value
        // of the bit. Only the high part carries information so it's all we keep.
        let mut durations = [0; DATA_BITS];
        for d in durations.iter_mut() {
            wait_while(port, pin, Level::Low, "timeout waiting for low pulse to end")?;
            *d = wait_while(port, pin, Level::High, "timeout waiting for high pulse to end")?;
        }

        Ok(Self { durations })
    }

    /// Return an iterator over the 40 high pulse durations, in the order received.
    pub(crate) fn high(&self) -> impl ExactSizeIterator<Item = &u32> {
        self.durations.iter()
    }
}

/// Busy-poll the pin while it stays at `level`, returning how many microseconds
/// it stayed there or a timeout error once that exceeds the watchdog.
fn wait_while(port: &dyn GpioPort, pin: u8, level: Level, msg: &'static str) -> Result<u32, SensorError> {
    let start = port.now_micros();

    loop {
        let current = port.read(pin);
        let elapsed = port.now_micros().wrapping_sub(start);

        if current != level {
            return Ok(elapsed);
        }

        if elapsed > WATCHDOG_MICROS {
            return Err(SensorError::KindMsg(SensorErrorKind::Timeout, msg));
        }
    }
}
