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

#![cfg(test)]

use crate::sensor::core::{Direction, GpioPort, Level};
use crate::sensor::frame::DATA_SIZE;
use crate::sensor::priority::Scheduler;
use crate::sensor::pulse::DATA_BITS;
use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

const RESPONSE_DELAY_MICROS: u32 = 30;
const RESPONSE_LOW_MICROS: u32 = 80;
const RESPONSE_HIGH_MICROS: u32 = 80;
const BIT_LOW_MICROS: u32 = 50;
const ZERO_HIGH_MICROS: u32 = 26;
const ONE_HIGH_MICROS: u32 = 70;

/// GpioPort implementation specifically to test timeouts: the pin is stuck at a
/// single level while the clock keeps moving.
pub(crate) struct TimeoutPort {
    level: Level,
    now: Cell<u32>,
}

impl TimeoutPort {
    pub(crate) fn new(level: Level) -> Self {
        TimeoutPort {
            level,
            now: Cell::new(0),
        }
    }
}

impl GpioPort for TimeoutPort {
    fn set_direction(&mut self, _pin: u8, _direction: Direction) {
        // NOP
    }

    fn write(&mut self, _pin: u8, _level: Level) {
        // NOP
    }

    fn read(&self, _pin: u8) -> Level {
        self.now.set(self.now.get().wrapping_add(1));
        self.level
    }

    fn now_micros(&self) -> u32 {
        self.now.get()
    }

    fn delay_millis(&mut self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms * 1000));
    }
}

/// GpioPort implementation where the pin stays at one level for a fixed number of
/// microseconds and then switches to the other level for good.
pub(crate) struct StepPort {
    level: Level,
    micros: u32,
    now: Cell<u32>,
}

impl StepPort {
    pub(crate) fn new(level: Level, micros: u32) -> Self {
        StepPort {
            level,
            micros,
            now: Cell::new(0),
        }
    }
}

impl GpioPort for StepPort {
    fn set_direction(&mut self, _pin: u8, _direction: Direction) {
        // NOP
    }

    fn write(&mut self, _pin: u8, _level: Level) {
        // NOP
    }

    fn read(&self, _pin: u8) -> Level {
        let now = self.now.get() + 1;
        self.now.set(now);

        match (now < self.micros, self.level) {
            (true, level) => level,
            (false, Level::High) => Level::Low,
            (false, Level::Low) => Level::High,
        }
    }

    fn now_micros(&self) -> u32 {
        self.now.get()
    }

    fn delay_millis(&mut self, ms: u32) {
        self.now.set(self.now.get() + ms * 1000);
    }
}

/// GpioPort implementation that plays back the waveform a DHT22 would send for the
/// given bytes, using a simulated microsecond clock.
///
/// Each read of the pin advances the clock by one microsecond. The waveform starts
/// when the pin is switched to input mode so the same port can be read repeatedly.
pub(crate) struct SimulatedPort {
    highs: Vec<u32>,
    now: Cell<u32>,
    input_since: Option<u32>,
    stuck_high_at: Option<u32>,
    directions: Vec<(u8, Direction)>,
    writes: Vec<Level>,
    delays: Vec<u32>,
}

impl SimulatedPort {
    pub(crate) fn from_bytes(data: [u8; DATA_SIZE]) -> Self {
        let highs = (0..DATA_BITS)
            .map(|i| {
                if data[i / 8] & (0x80 >> (i % 8)) > 0 {
                    ONE_HIGH_MICROS
                } else {
                    ZERO_HIGH_MICROS
                }
            })
            .collect();

        SimulatedPort {
            highs,
            now: Cell::new(0),
            input_since: None,
            stuck_high_at: None,
            directions: Vec::new(),
            writes: Vec::new(),
            delays: Vec::new(),
        }
    }

    /// Start the simulated clock at the given value instead of zero.
    pub(crate) fn starting_at(self, micros: u32) -> Self {
        self.now.set(micros);
        self
    }

    /// Replace the high pulse for a single bit with one of the given length.
    pub(crate) fn with_high_pulse(mut self, bit: usize, micros: u32) -> Self {
        self.highs[bit] = micros;
        self
    }

    /// Stop sending after the given number of bits, leaving the line low.
    pub(crate) fn truncated_after_bits(mut self, bits: usize) -> Self {
        self.highs.truncate(bits);
        self
    }

    /// Hold the line high from the given number of microseconds after the pin was
    /// switched to input mode, as if the sensor stopped responding.
    pub(crate) fn stuck_high_after(mut self, micros: u32) -> Self {
        self.stuck_high_at = Some(micros);
        self
    }

    pub(crate) fn directions(&self) -> Vec<(u8, Direction)> {
        self.directions.clone()
    }

    pub(crate) fn writes(&self) -> Vec<Level> {
        self.writes.clone()
    }

    pub(crate) fn delays(&self) -> Vec<u32> {
        self.delays.clone()
    }

    fn level_at(&self, offset: u32) -> Level {
        if matches!(self.stuck_high_at, Some(at) if offset >= at) {
            return Level::High;
        }

        let mut segments = vec![
            (Level::High, RESPONSE_DELAY_MICROS),
            (Level::Low, RESPONSE_LOW_MICROS),
            (Level::High, RESPONSE_HIGH_MICROS),
        ];

        for &h in self.highs.iter() {
            segments.push((Level::Low, BIT_LOW_MICROS));
            segments.push((Level::High, h));
        }

        let mut end = 0;
        for (level, micros) in segments {
            end += micros;
            if offset < end {
                return level;
            }
        }

        // A complete frame is followed by the sensor releasing the line after a final
        // low pulse. A truncated frame leaves the line held low.
        if self.highs.len() == DATA_BITS && offset >= end + BIT_LOW_MICROS {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl GpioPort for SimulatedPort {
    fn set_direction(&mut self, pin: u8, direction: Direction) {
        self.directions.push((pin, direction));
        self.input_since = match direction {
            Direction::Input => Some(self.now.get()),
            Direction::Output => None,
        };
    }

    fn write(&mut self, _pin: u8, level: Level) {
        self.writes.push(level);
    }

    fn read(&self, _pin: u8) -> Level {
        let now = self.now.get().wrapping_add(1);
        self.now.set(now);

        match self.input_since {
            Some(start) => self.level_at(now.wrapping_sub(start)),
            None => Level::High,
        }
    }

    fn now_micros(&self) -> u32 {
        self.now.get()
    }

    fn delay_millis(&mut self, ms: u32) {
        self.delays.push(ms);
        self.now.set(self.now.get().wrapping_add(ms * 1000));
    }
}

/// Scheduler implementation that counts elevations and restorations. Clones share
/// the same counters so a copy can be kept after handing one to a reader.
#[derive(Debug, Clone)]
pub(crate) struct CountingScheduler {
    deny: bool,
    elevated: Arc<AtomicBool>,
    elevations: Arc<AtomicU32>,
    restorations: Arc<AtomicU32>,
}

impl CountingScheduler {
    /// Create a new scheduler, optionally denying every request to elevate priority.
    pub(crate) fn new(deny: bool) -> Self {
        CountingScheduler {
            deny,
            elevated: Default::default(),
            elevations: Default::default(),
            restorations: Default::default(),
        }
    }

    pub(crate) fn is_elevated(&self) -> bool {
        self.elevated.load(Ordering::SeqCst)
    }

    pub(crate) fn elevations(&self) -> u32 {
        self.elevations.load(Ordering::SeqCst)
    }

    pub(crate) fn restorations(&self) -> u32 {
        self.restorations.load(Ordering::SeqCst)
    }
}

impl Scheduler for CountingScheduler {
    fn elevate(&self) -> io::Result<()> {
        self.elevations.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "operation not permitted"));
        }

        self.elevated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&self) -> io::Result<()> {
        self.restorations.fetch_add(1, Ordering::SeqCst);
        self.elevated.store(false, Ordering::SeqCst);
        Ok(())
    }
}
