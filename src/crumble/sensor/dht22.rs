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

use crate::sensor::core::{GpioPort, Measurement, ReadSensor, SensorError};
use crate::sensor::frame::Frame;
use crate::sensor::priority::Scheduler;
use crate::sensor::pulse::Pulses;
use std::fmt::{Debug, Formatter};

/// Read temperature in degrees celsius and relative humidity from DHT22 sensors
/// connected to pins of a GPIO controller.
pub struct DHT22Reader {
    port: Box<dyn GpioPort + Send + 'static>,
    scheduler: Box<dyn Scheduler + Send + 'static>,
}

impl DHT22Reader {
    pub fn new<P, S>(port: P, scheduler: S) -> Self
    where
        P: GpioPort + Send + 'static,
        S: Scheduler + Send + 'static,
    {
        Self {
            port: Box::new(port),
            scheduler: Box::new(scheduler),
        }
    }
}

impl ReadSensor for DHT22Reader {
    /// Read temperature and humidity from the sensor on the given pin or return an
    /// error if the read failed with details about what caused the read to fail.
    ///
    /// Note the DHT22 sensor should only be read every two seconds at most.
    fn read(&mut self, pin: u8) -> Result<Measurement, SensorError> {
        let pulses = Pulses::sample(self.port.as_mut(), self.scheduler.as_ref(), pin)?;
        let frame = Frame::from_pulses(&pulses)?;
        Ok(frame.into())
    }

    fn wait_millis(&mut self, ms: u32) {
        self.port.delay_millis(ms);
    }
}

impl Debug for DHT22Reader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DHT22Reader").finish_non_exhaustive()
    }
}
