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
use rppal::gpio::{Gpio, IoPin, Mode};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::thread;
use std::time::{Duration, Instant};

/// GPIO port backed by the Raspberry PI GPIO controller via `rppal`.
///
/// Pins are acquired up front by `open_port` and held for the life of the port.
pub struct RppalPort {
    pins: HashMap<u8, IoPin>,
    epoch: Instant,
}

/// Create a new `RppalPort` that owns the given BCM GPIO pins, the data wires
/// of each sensor. The same pin may be given more than once.
///
/// Note that the BCM GPIO pin number is NOT the same as the physical pin number.
/// See [pinout] for more information.
///
/// [pinout]: https://www.raspberrypi.com/documentation/computers/os.html#gpio-and-the-40-pin-header
pub fn open_port(bcm_gpio_pins: &[u8]) -> Result<RppalPort, SensorError> {
    let controller = Gpio::new().map_err(|e| {
        SensorError::KindMsgCause(
            SensorErrorKind::Initialization,
            "unable to create GPIO controller",
            Box::new(e),
        )
    })?;

    let mut pins = HashMap::with_capacity(bcm_gpio_pins.len());
    for &bcm_gpio_pin in bcm_gpio_pins {
        if pins.contains_key(&bcm_gpio_pin) {
            continue;
        }

        let pin = controller.get(bcm_gpio_pin).map_err(|e| {
            SensorError::KindMsgCause(
                SensorErrorKind::Initialization,
                "unable to acquire pin from controller",
                Box::new(e),
            )
        })?;

        tracing::debug!(message = "acquired GPIO pin", bcm_pin = bcm_gpio_pin);
        pins.insert(bcm_gpio_pin, pin.into_io(Mode::Input));
    }

    Ok(RppalPort {
        pins,
        epoch: Instant::now(),
    })
}

impl RppalPort {
    fn io_pin(&self, pin: u8) -> Option<&IoPin> {
        let res = self.pins.get(&pin);
        if res.is_none() {
            tracing::error!(message = "pin was not acquired when opening the port", bcm_pin = pin);
        }

        res
    }

    fn io_pin_mut(&mut self, pin: u8) -> Option<&mut IoPin> {
        let res = self.pins.get_mut(&pin);
        if res.is_none() {
            tracing::error!(message = "pin was not acquired when opening the port", bcm_pin = pin);
        }

        res
    }
}

impl GpioPort for RppalPort {
    fn set_direction(&mut self, pin: u8, direction: Direction) {
        if let Some(p) = self.io_pin_mut(pin) {
            p.set_mode(match direction {
                Direction::Input => Mode::Input,
                Direction::Output => Mode::Output,
            });
        }
    }

    fn write(&mut self, pin: u8, level: Level) {
        if let Some(p) = self.io_pin_mut(pin) {
            match level {
                Level::Low => p.set_low(),
                Level::High => p.set_high(),
            }
        }
    }

    fn read(&self, pin: u8) -> Level {
        // Unknown pins read as an idle, pulled-up line so that any read of them
        // ends in a timeout instead of garbage data.
        match self.io_pin(pin) {
            Some(p) if p.is_low() => Level::Low,
            _ => Level::High,
        }
    }

    fn now_micros(&self) -> u32 {
        // Truncation is expected, the counter wraps every ~71 minutes.
        self.epoch.elapsed().as_micros() as u32
    }

    fn delay_millis(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

impl Debug for RppalPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut pins: Vec<&u8> = self.pins.keys().collect();
        pins.sort();
        f.debug_struct("RppalPort").field("pins", &pins).finish()
    }
}
