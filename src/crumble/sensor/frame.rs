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

use crate::sensor::core::{Humidity, Measurement, SensorError, TemperatureCelsius};
use crate::sensor::pulse::Pulses;
use std::ops::Range;

pub(crate) const DATA_SIZE: usize = 5;

/// High pulse durations, in microseconds, that are read as a zero bit.
const ZERO_MICROS: Range<u32> = 15..40;

/// High pulse durations, in microseconds, that are read as a one bit.
const ONE_MICROS: Range<u32> = 60..90;

/// Value of a single bit sent by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bit {
    Zero,
    One,
}

impl Bit {
    /// Determine the bit a high pulse of the given duration represents, if any.
    ///
    /// Durations between the zero and one ranges are rejected instead of being
    /// rounded to whichever is closer, as are durations outside of both.
    pub(crate) fn classify(micros: u32) -> Option<Bit> {
        if ZERO_MICROS.contains(&micros) {
            Some(Bit::Zero)
        } else if ONE_MICROS.contains(&micros) {
            Some(Bit::One)
        } else {
            None
        }
    }
}

/// Bytes read from a sensor, computed from high pulse durations.
///
/// Bytes read make up humidity data, temperature data, and a checksum to ensure
/// the reading is valid. Instances can only be created from data with a valid
/// checksum and so can always be converted to a temperature and humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    bytes: [u8; DATA_SIZE],
}

impl Frame {
    pub(crate) fn from_pulses(pulses: &Pulses) -> Result<Self, SensorError> {
        let mut bytes: [u8; DATA_SIZE] = [0; DATA_SIZE];

        for (i, &v) in pulses.high().enumerate() {
            // There are 40 high pulse durations and hence 40 bits of data that we need
            // to parse, most significant bit first. Divide by eight to figure out which
            // byte this bit will end up in and shift the current value left (we only
            // operate on the LSB each iteration).
            let index = i / 8;
            bytes[index] <<= 1;

            match Bit::classify(v) {
                Some(Bit::One) => bytes[index] |= 1,
                Some(Bit::Zero) => {}
                None => return Err(SensorError::PulseWidth(i, v)),
            }
        }

        Self::from_bytes(bytes)
    }

    pub(crate) fn from_bytes(bytes: [u8; DATA_SIZE]) -> Result<Self, SensorError> {
        // Byte five is a checksum of the first four bytes, return an error if it indicates
        // the data we've read is corrupt somehow.
        Self::checksum_bytes(&bytes)?;
        Ok(Frame { bytes })
    }

    fn checksum_bytes(bytes: &[u8; DATA_SIZE]) -> Result<(), SensorError> {
        // From the DHT22 datasheet:
        // > If the data transmission is right, check-sum should be the last 8 bit of
        // > "8 bit integral RH data+8 bit decimal RH data+8 bit integral T data+8 bit
        // > decimal T data".
        let expected = bytes[4];
        let computed = bytes[..4].iter().fold(0u8, |sum, &b| sum.wrapping_add(b));

        tracing::debug!(
            message = "computing checksum for sensor data",
            computed = computed,
            expected = expected
        );

        if computed != expected {
            Err(SensorError::CheckSum(expected, computed))
        } else {
            Ok(())
        }
    }
}

impl From<Frame> for Measurement {
    /// Convert a `Frame` sensor reading into temperature and humidity measurements.
    fn from(frame: Frame) -> Self {
        // See https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
        // first two bytes are humidity as a u16 * 10
        let humidity_raw = u16::from_be_bytes([frame.bytes[0], frame.bytes[1]]);
        // second two bytes are temperature as a u16 * 10 with the highest bit indicating sign
        let temp_raw = u16::from_be_bytes([frame.bytes[2], frame.bytes[3]]);
        let temp_magnitude = temp_raw & 0x7FFF;

        let humidity_dec = humidity_raw as f64 / 10.0;
        let mut temp_dec = temp_magnitude as f64 / 10.0;
        if temp_raw & 0x8000 != 0 {
            temp_dec = -temp_dec;
        }

        let humidity = Humidity::from(humidity_dec);
        let temperature = TemperatureCelsius::from(temp_dec);

        tracing::debug!(
            message = "parsed sensor data",
            raw_temperature = temp_raw,
            raw_humidity = humidity_raw,
            temperature = %temperature,
            humidity = %humidity
        );

        Measurement { temperature, humidity }
    }
}

#[cfg(test)]
mod test {
    use super::{Bit, Frame, DATA_SIZE};
    use crate::sensor::core::{Humidity, Measurement, SensorError, SensorErrorKind, TemperatureCelsius};
    use crate::sensor::pulse::{Pulses, DATA_BITS};

    const ZERO: u32 = 26;
    const ONE: u32 = 70;

    fn pulses_for(bytes: [u8; DATA_SIZE]) -> [u32; DATA_BITS] {
        let mut durations = [0; DATA_BITS];
        for (i, d) in durations.iter_mut().enumerate() {
            let bit = bytes[i / 8] & (0x80 >> (i % 8));
            *d = if bit > 0 { ONE } else { ZERO };
        }

        durations
    }

    fn with_checksum(data: [u8; 4]) -> [u8; DATA_SIZE] {
        let sum = data.iter().fold(0u8, |s, &b| s.wrapping_add(b));
        [data[0], data[1], data[2], data[3], sum]
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(None, Bit::classify(0));
        assert_eq!(None, Bit::classify(14));
        assert_eq!(Some(Bit::Zero), Bit::classify(15));
        assert_eq!(Some(Bit::Zero), Bit::classify(39));
        assert_eq!(None, Bit::classify(40));
        assert_eq!(None, Bit::classify(50));
        assert_eq!(None, Bit::classify(59));
        assert_eq!(Some(Bit::One), Bit::classify(60));
        assert_eq!(Some(Bit::One), Bit::classify(89));
        assert_eq!(None, Bit::classify(90));
        assert_eq!(None, Bit::classify(u32::MAX));
    }

    #[test]
    fn test_classify_all_durations() {
        for d in 0..200 {
            let expected = if (15..40).contains(&d) {
                Some(Bit::Zero)
            } else if (60..90).contains(&d) {
                Some(Bit::One)
            } else {
                None
            };

            assert_eq!(expected, Bit::classify(d), "duration {}", d);
        }
    }

    #[test]
    fn test_reading_checksum_valid() {
        // Example data, from the datasheet: https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
        let mut bytes = [0; DATA_SIZE];
        bytes[0] = 0b0000_0010; // humidity 1
        bytes[1] = 0b1000_1100; // humidity 2
        bytes[2] = 0b0000_0001; // temperature 1
        bytes[3] = 0b0101_1111; // temperature 2
        bytes[4] = 0b1110_1110; // checksum

        let res = Frame::checksum_bytes(&bytes);
        assert!(res.is_ok())
    }

    #[test]
    fn test_reading_checksum_invalid() {
        let mut bytes = [0; DATA_SIZE];
        bytes[0] = 0b0000_0010; // humidity 1
        bytes[1] = 0b1000_1100; // humidity 2
        bytes[2] = 0b0000_0001; // temperature 1
        bytes[3] = 0b0101_1111; // temperature 2
        bytes[4] = 0b0000_0000; // checksum, invalid

        match Frame::checksum_bytes(&bytes).unwrap_err() {
            SensorError::CheckSum(expected, got) => {
                assert_eq!(0b0000_0000, expected); // `expected` is what is part of the data
                assert_eq!(0b1110_1110, got); // `got` is what was computed based on the data
            }
            e => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_checksum_wraps() {
        assert!(Frame::from_bytes([0xFF, 0xFF, 0xFF, 0xFF, 0xFC]).is_ok());
        assert!(Frame::from_bytes([0x80, 0x80, 0x00, 0x00, 0x00]).is_ok());
        assert!(Frame::from_bytes([0x00, 0x00, 0x00, 0x00, 0x00]).is_ok());
    }

    #[test]
    fn test_checksum_single_bit_corruption() {
        let samples = [[0x02, 0x8C, 0x00, 0xC8], [0x00, 0x00, 0x00, 0x00], [0xFF, 0x01, 0x80, 0x96]];

        for data in samples {
            let bytes = with_checksum(data);
            assert!(Frame::from_bytes(bytes).is_ok());

            for bit in 0..8 {
                let mut corrupt = bytes;
                corrupt[4] ^= 1 << bit;
                let res = Frame::from_bytes(corrupt);
                assert_eq!(SensorErrorKind::Checksum, res.unwrap_err().kind());
            }
        }
    }

    #[test]
    fn test_reading_into_positive_temp() {
        let frame = Frame::from_bytes(with_checksum([0x00, 0x00, 0x00, 0x96])).unwrap();
        let m = Measurement::from(frame);

        assert_eq!(TemperatureCelsius::from(15.0), m.temperature);
    }

    #[test]
    fn test_reading_into_negative_temp() {
        let frame = Frame::from_bytes(with_checksum([0x00, 0x00, 0x80, 0x96])).unwrap();
        let m = Measurement::from(frame);

        assert_eq!(TemperatureCelsius::from(-15.0), m.temperature);
    }

    #[test]
    fn test_reading_into_humidity() {
        let frame = Frame::from_bytes(with_checksum([0x02, 0x62, 0x00, 0x00])).unwrap();
        let m = Measurement::from(frame);

        assert_eq!(Humidity::from(61.0), m.humidity);
    }

    #[test]
    fn test_reading_into_datasheet_example() {
        // Example data, from the datasheet: https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
        let frame = Frame::from_bytes([0b0000_0010, 0b1000_1100, 0b1000_0000, 0b0110_0101, 0b0111_0011]).unwrap();
        let m = Measurement::from(frame);

        assert_eq!(TemperatureCelsius::from(-10.1), m.temperature);
        assert_eq!(Humidity::from(65.2), m.humidity);
    }

    #[test]
    fn test_from_pulses_valid() {
        // 0x02 + 0x8C + 0x00 + 0xC8 = 0x156, the checksum is the low byte
        let pulses = Pulses::from_durations(pulses_for([0x02, 0x8C, 0x00, 0xC8, 0x56]));
        let m = Measurement::from(Frame::from_pulses(&pulses).unwrap());

        assert_eq!(Humidity::from(65.2), m.humidity);
        assert_eq!(TemperatureCelsius::from(20.0), m.temperature);
    }

    #[test]
    fn test_from_pulses_checksum_mismatch() {
        let pulses = Pulses::from_durations(pulses_for([0x02, 0x8C, 0x00, 0xC8, 0x94]));
        let res = Frame::from_pulses(&pulses);

        assert_eq!(SensorErrorKind::Checksum, res.unwrap_err().kind());
    }

    #[test]
    fn test_from_pulses_ambiguous_width() {
        let mut durations = pulses_for([0x02, 0x8C, 0x00, 0xC8, 0x56]);
        durations[12] = 50;
        let res = Frame::from_pulses(&Pulses::from_durations(durations));

        match res.unwrap_err() {
            SensorError::PulseWidth(bit, micros) => {
                assert_eq!(12, bit);
                assert_eq!(50, micros);
            }
            e => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_from_pulses_too_short_and_too_long() {
        let mut durations = pulses_for([0x02, 0x8C, 0x00, 0xC8, 0x56]);
        durations[0] = 14;
        let res = Frame::from_pulses(&Pulses::from_durations(durations));
        assert_eq!(SensorErrorKind::InvalidPulseWidth, res.unwrap_err().kind());

        let mut durations = pulses_for([0x02, 0x8C, 0x00, 0xC8, 0x56]);
        durations[39] = 90;
        let res = Frame::from_pulses(&Pulses::from_durations(durations));
        assert_eq!(SensorErrorKind::InvalidPulseWidth, res.unwrap_err().kind());
    }

    #[test]
    fn test_invalid_width_wins_over_checksum() {
        let mut durations = pulses_for([0x02, 0x8C, 0x00, 0xC8, 0x00]);
        durations[33] = 45;
        let res = Frame::from_pulses(&Pulses::from_durations(durations));

        assert_eq!(SensorErrorKind::InvalidPulseWidth, res.unwrap_err().kind());
    }
}
