//! AHT10 temperature and humidity sensor driver.
//!
//! The AHT10 has no register map. It takes a command, possibly with two parameter bytes, and
//! answers reads with a status byte followed by the measurement. The flow this driver implements:
//!
//! ```text
//!   Command::SoftReset (0xBA)
//!                  │
//!                  ▼
//!             Wait 20 ms
//!                  │
//!                  ▼
//! Command::TriggerMeasurement (0xAC)  ◄──┐
//!                  │                     │
//!                  ▼                     │
//!             Wait 200 ms                │
//!                  │                     │
//!                  ▼                     │
//!             Read 6 bytes               │
//!                  │                     │
//!                  ▼                     │
//!             Status::Busy ──► Yes ──────┘  (caller decides)
//!                  │
//!                  ▼
//!                 No
//!                  │
//!                  ▼
//!        Calc Humidity and Temp
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::i2c_io::I2cIo;
use crate::Error;

/// AHT10 sensor's I2C address.
pub const SENSOR_ADDRESS: u8 = 0b0011_1000; // This is I2C address 0x38;

/// Commands that can be sent to the AHT10 sensor.
///
/// TriggerMeasurement takes two parameter bytes that the datasheet lists without explaining.
/// Consider the command and its parameters to be one three-byte command.
pub enum Command {
    TriggerMeasurement = 0b1010_1100, // 0xAC
    // This command takes two bytes of parameter: 0b0011_0011 (0x33), then 0b0000_0000 (0x00).
    // The conversion needs at least 75ms. We give it 200ms before reading 6 bytes back.
    SoftReset = 0b1011_1010, // 0xBA
    // Takes no more than 20ms to complete.
}

/// Status byte meanings.
pub enum Status {
    Busy = 0b1000_0000, // Status bit for busy - 8th bit enabled. 1<<7, 0x80
    // 1 is Busy measuring. 0 is "Free in dormant state" or "ready".
}

/// Time the sensor needs after a soft reset.
const RESET_DELAY_MS: u32 = 20;
/// Time we give a measurement before reading it back.
const MEASUREMENT_DELAY_MS: u32 = 200;

/// SensorStatus is the first byte of every AHT10 measurement response.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct SensorStatus(pub u8);

impl SensorStatus {
    /// Create a new SensorStatus from an AHT10 status byte.
    pub fn new(status: u8) -> Self {
        SensorStatus(status)
    }

    /// Check if the measurement that came with this status byte is usable.
    pub fn is_ready(self) -> bool {
        // The busy bit should be 0 (not busy) for the sensor to report ready.
        (self.0 & Status::Busy as u8) == 0
    }
}

/// The five measurement bytes that follow the status byte.
///
/// 20 bits of humidity followed by 20 bits of temperature. The middle byte is split between
/// the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct RawSample(pub [u8; 5]);

impl RawSample {
    /// The 20-bit raw humidity value.
    pub fn humidity(&self) -> u32 {
        let data = &self.0;
        // Two full bytes, then the top four bits of the split byte.
        (u32::from(data[0]) << 12) | (u32::from(data[1]) << 4) | (u32::from(data[2]) >> 4)
    }

    /// The 20-bit raw temperature value.
    pub fn temperature(&self) -> u32 {
        let data = &self.0;
        // The bottom four bits of the split byte, then two full bytes.
        (u32::from(data[2] & 0b0000_1111) << 16) | (u32::from(data[3]) << 8) | u32::from(data[4])
    }
}

/// SensorReading is a single reading from the AHT10 sensor.
///
/// You get:
/// * humidity in % Relative Humidity
/// * temperature in degrees Celsius.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct SensorReading {
    pub humidity: f32,
    pub temperature: f32,
}

impl From<RawSample> for SensorReading {
    fn from(sample: RawSample) -> Self {
        let full_scale = (1u32 << 20) as f32;
        SensorReading {
            humidity: sample.humidity() as f32 / full_scale * 100.0,
            temperature: sample.temperature() as f32 / full_scale * 200.0 - 50.0,
        }
    }
}

/// An AHT10 sensor on the I2C bus `I`.
///
/// The address of the sensor will be `SENSOR_ADDRESS` from this module, unless there is some kind
/// of special address translating hardware in use.
pub struct Aht10<I> {
    io: I2cIo<I>,
}

impl<E, I> Aht10<I>
where
    I: I2c<Error = E>,
{
    /// Create the driver. No bus traffic happens until you call a method.
    pub fn new(i2c: I, address: u8) -> Self {
        Aht10 {
            io: I2cIo::new(i2c, address),
        }
    }

    /// Send the Soft Reset command to the sensor.
    ///
    /// Returns after the full 20ms the sensor may need, so a measurement can be triggered right
    /// away.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.io.write(&[Command::SoftReset as u8], &[])?;
        delay.delay_ms(RESET_DELAY_MS);

        #[cfg(feature = "use-defmt")]
        defmt::debug!("AHT10 reset complete");

        Ok(())
    }

    /// Trigger one measurement and return the sensor's 5 raw data bytes.
    ///
    /// This takes at least 200ms. `Ok(None)` means the sensor flagged the response as busy,
    /// which is normal shortly after power-up. Nothing is retried, call again when you want
    /// another attempt.
    pub fn trigger_measurement(
        &mut self,
        delay: &mut impl DelayNs,
    ) -> Result<Option<RawSample>, Error<E>> {
        // Two parameters as described in the datasheet. There is no indication what these
        // parameters mean, just that they should be provided.
        self.io.write(
            &[Command::TriggerMeasurement as u8],
            &[
                0b0011_0011, // 0x33
                0b0000_0000, // 0x00
            ],
        )?;
        delay.delay_ms(MEASUREMENT_DELAY_MS);

        // 1 byte status, 20 bits humidity + 20 bits temperature
        let data: [u8; 6] = self.io.read(&[], 0, delay)?;

        let status = SensorStatus::new(data[0]);
        if !status.is_ready() {
            #[cfg(feature = "use-defmt")]
            defmt::warn!("AHT10 busy, status {=u8:#x}", data[0]);
            return Ok(None);
        }

        Ok(Some(RawSample([data[1], data[2], data[3], data[4], data[5]])))
    }

    /// Measure temperature and humidity.
    ///
    /// Same as `trigger_measurement`, with the raw bytes converted to physical units.
    pub fn measure(&mut self, delay: &mut impl DelayNs) -> Result<Option<SensorReading>, Error<E>> {
        Ok(self.trigger_measurement(delay)?.map(SensorReading::from))
    }

    /// Destroys this driver and releases the I2C bus `I`.
    pub fn destroy(self) -> I {
        self.io.destroy()
    }
}
