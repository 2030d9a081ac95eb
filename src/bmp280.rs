//! BMP280 pressure and temperature sensor driver.
//!
//! [BMP280 Datasheet](https://www.bosch-sensortec.com/media/boschsensortec/downloads/datasheets/bst-bmp280-ds001.pdf)
//!
//! Section references in this file are to revision 1.14 of the datasheet.
//!
//! Example:
//!
//!     # use embedded_hal_mock::eh1::delay::NoopDelay as MockDelay;
//!     # use embedded_hal_mock::eh1::i2c::Mock as I2cMock;
//!     # use embedded_hal_mock::eh1::i2c::Transaction;
//!     # use peripheral_drivers::Deadline;
//!     # use peripheral_drivers::bmp280::{Bmp280, Calibration, PowerMode, PRIMARY_ADDRESS};
//!     # let calibration = Calibration {
//!     #     dig_t1: 27504, dig_t2: 26435, dig_t3: -1000,
//!     #     dig_p1: 36477, dig_p2: -10685, dig_p3: 3024, dig_p4: 2855, dig_p5: 140,
//!     #     dig_p6: -7, dig_p7: 15500, dig_p8: -14600, dig_p9: 6000,
//!     # };
//!     # let expectations = vec![
//!     #     Transaction::write(PRIMARY_ADDRESS, vec![0xE0, 0xB6]),
//!     #     Transaction::write_read(PRIMARY_ADDRESS, vec![0xD0], vec![0x58]),
//!     #     Transaction::write(PRIMARY_ADDRESS, vec![0x88]),
//!     #     Transaction::read(PRIMARY_ADDRESS, calibration.to_bytes().to_vec()),
//!     #     Transaction::write(PRIMARY_ADDRESS, vec![0xF4, 0x27]),
//!     #     Transaction::write_read(PRIMARY_ADDRESS, vec![0xF4], vec![0x27]),
//!     #     Transaction::write_read(PRIMARY_ADDRESS, vec![0xF3], vec![0x00]),
//!     #     Transaction::write_read(
//!     #         PRIMARY_ADDRESS,
//!     #         vec![0xF7],
//!     #         vec![0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00],
//!     #     ),
//!     # ];
//!     # let mock_i2c = I2cMock::new(&expectations);
//!     # let mut mock_delay = MockDelay::new();
//!     let mut bmp280 = Bmp280::new(mock_i2c, PRIMARY_ADDRESS);
//!     let mut sensor = bmp280.init(&mut mock_delay).unwrap();
//!     assert_eq!(sensor.mode(), PowerMode::Normal);
//!
//!     // Give up if the sensor is still converting after 100 status checks.
//!     let reading = sensor.read_data(&mut mock_delay, Deadline::Polls(100)).unwrap();
//!
//!     println!("temperature (bmp280): {:.2}C", reading.temperature);
//!     println!("pressure (bmp280): {:.2}hPa", reading.pressure);
//!     # bmp280.destroy().done();
//!
//! ```text
//!        Command: reset (0xE0 ◄ 0xB6)
//!                  │
//!                  ▼
//!              Wait 1 s
//!                  │
//!                  ▼
//!           Read id (0xD0) ──► not 0x58 ──► UnexpectedDeviceId
//!                  │
//!                  ▼
//!      Read calibration (0x88..0x9F)
//!                  │
//!                  ▼
//!        ctrl_meas (0xF4) ◄ 0x27
//!                  │
//!                  ▼
//!             Wait 500 ms
//!                  │
//!                  ▼
//!     Read back 0xF4 ──► not 0x27 ──► ctrl_meas ◄ 0x01 (forced)
//!                  │                          │
//!                  ▼                          │
//!            PowerMode::Normal         PowerMode::Forced
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::i2c_io::I2cIo;
use crate::poll::{poll_until, Deadline};
use crate::Error;

/// BMP280 I2C address with SDO tied to ground.
pub const PRIMARY_ADDRESS: u8 = 0x76;
/// BMP280 I2C address with SDO tied to VDDIO.
pub const SECONDARY_ADDRESS: u8 = 0x77;

/// Value of the BMP280 `id` register.
pub const CHIP_ID: u8 = 0x58;

/// Length of the temperature and pressure calibration block.
pub const CALIBRATION_LEN: usize = 24;

/// Register addresses.
///
/// Section 4.2, Table 18: Memory map.
mod reg {
    pub const CALIB_00: u8 = 0x88;
    pub const ID: u8 = 0xD0;
    pub const RESET: u8 = 0xE0;
    pub const STATUS: u8 = 0xF3;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const PRESS_MSB: u8 = 0xF7;
}

/// Writing this to `reset` performs a power-on reset.
const RESET_VALUE: u8 = 0xB6;

/// ctrl_meas: temperature x1, pressure x1, normal mode.
const CTRL_MEAS_NORMAL: u8 = 0b0010_0111; // 0x27
/// ctrl_meas written when normal mode does not stick. Forced mode, but with both oversampling
/// fields at 000, so this alone measures nothing.
const CTRL_MEAS_FORCED: u8 = 0b0000_0001; // 0x01
/// ctrl_meas: temperature x1, pressure x1, forced mode. Starts one conversion.
const CTRL_MEAS_FORCED_X1: u8 = 0b0010_0101; // 0x25

/// status bit 3, set while a conversion is running.
const STATUS_MEASURING: u8 = 0b0000_1000;

const RESET_DELAY_MS: u32 = 1_000;
const CALIBRATION_SETTLE_MS: u32 = 20;
const MODE_SETTLE_MS: u32 = 500;
const POLL_INTERVAL_MS: u32 = 10;

/// The mode the sensor ended up in after `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum PowerMode {
    /// Converting continuously. This is what `init` asks for.
    Normal,
    /// The sensor did not confirm normal mode. Every `read_raw_data` starts a single conversion.
    Forced,
}

/// Factory calibration coefficients, Section 3.11.2, Table 17.
///
/// `dig_t1` and `dig_p1` are unsigned, the rest are signed. All are stored little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct Calibration {
    pub dig_t1: u16, // 0x88..0x89
    pub dig_t2: i16, // 0x8A..0x8B
    pub dig_t3: i16, // 0x8C..0x8D
    pub dig_p1: u16, // 0x8E..0x8F
    pub dig_p2: i16, // 0x90..0x91
    pub dig_p3: i16, // 0x92..0x93
    pub dig_p4: i16, // 0x94..0x95
    pub dig_p5: i16, // 0x96..0x97
    pub dig_p6: i16, // 0x98..0x99
    pub dig_p7: i16, // 0x9A..0x9B
    pub dig_p8: i16, // 0x9C..0x9D
    pub dig_p9: i16, // 0x9E..0x9F
}

impl Calibration {
    /// Decode the calibration block as read from register 0x88 onwards.
    pub fn from_bytes(buf: &[u8; CALIBRATION_LEN]) -> Self {
        Calibration {
            dig_t1: u16::from_le_bytes([buf[0], buf[1]]),
            dig_t2: i16::from_le_bytes([buf[2], buf[3]]),
            dig_t3: i16::from_le_bytes([buf[4], buf[5]]),
            dig_p1: u16::from_le_bytes([buf[6], buf[7]]),
            dig_p2: i16::from_le_bytes([buf[8], buf[9]]),
            dig_p3: i16::from_le_bytes([buf[10], buf[11]]),
            dig_p4: i16::from_le_bytes([buf[12], buf[13]]),
            dig_p5: i16::from_le_bytes([buf[14], buf[15]]),
            dig_p6: i16::from_le_bytes([buf[16], buf[17]]),
            dig_p7: i16::from_le_bytes([buf[18], buf[19]]),
            dig_p8: i16::from_le_bytes([buf[20], buf[21]]),
            dig_p9: i16::from_le_bytes([buf[22], buf[23]]),
        }
    }

    /// Encode back into the register layout `from_bytes` reads.
    pub fn to_bytes(&self) -> [u8; CALIBRATION_LEN] {
        let words = [
            self.dig_t1.to_le_bytes(),
            self.dig_t2.to_le_bytes(),
            self.dig_t3.to_le_bytes(),
            self.dig_p1.to_le_bytes(),
            self.dig_p2.to_le_bytes(),
            self.dig_p3.to_le_bytes(),
            self.dig_p4.to_le_bytes(),
            self.dig_p5.to_le_bytes(),
            self.dig_p6.to_le_bytes(),
            self.dig_p7.to_le_bytes(),
            self.dig_p8.to_le_bytes(),
            self.dig_p9.to_le_bytes(),
        ];

        let mut buf = [0u8; CALIBRATION_LEN];
        for (chunk, word) in buf.chunks_exact_mut(2).zip(words.iter()) {
            chunk.copy_from_slice(word);
        }
        buf
    }

    /// Temperature compensation, Section 8.1, double precision version.
    ///
    /// Besides degrees Celsius this hands back the `FineTemperature` that pressure compensation
    /// of the same sample needs.
    pub fn compensate_temperature(&self, raw_temperature: u32) -> CompensatedTemperature {
        let adc_t = f64::from(raw_temperature);
        let t1 = f64::from(self.dig_t1);

        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.dig_t2);
        let var2 = (adc_t / 131072.0 - t1 / 8192.0)
            * (adc_t / 131072.0 - t1 / 8192.0)
            * f64::from(self.dig_t3);
        let t_fine = var1 + var2;

        CompensatedTemperature {
            celsius: t_fine / 5120.0,
            fine: FineTemperature(t_fine),
        }
    }

    /// Pressure compensation in hPa, Section 3.11.3, integer version.
    ///
    /// The fine temperature is consumed: compensate the temperature of the same sample first.
    /// Returns 0.0 when the calibration data makes the divisor zero, or is so far out of range
    /// that the intermediates do not fit. Treat that as "no reading", not as vacuum.
    pub fn compensate_pressure(&self, raw_pressure: u32, fine: FineTemperature) -> f64 {
        match self.pressure_q24_8(raw_pressure, fine.0 as i128) {
            // p is Pa in Q24.8
            Some(p) => p as f64 / 256.0 / 100.0,
            None => 0.0,
        }
    }

    /// The datasheet's 64 bit formula, widened to 128 bits. Any calibration block and 20-bit
    /// sample fits; the checks catch whatever does not.
    fn pressure_q24_8(&self, raw_pressure: u32, t_fine: i128) -> Option<i128> {
        let p1 = i128::from(self.dig_p1);
        let p2 = i128::from(self.dig_p2);
        let p3 = i128::from(self.dig_p3);
        let p4 = i128::from(self.dig_p4);
        let p5 = i128::from(self.dig_p5);
        let p6 = i128::from(self.dig_p6);
        let p7 = i128::from(self.dig_p7);
        let p8 = i128::from(self.dig_p8);
        let p9 = i128::from(self.dig_p9);

        let var1 = t_fine - 128_000;
        let var2 = var1
            .checked_mul(var1)?
            .checked_mul(p6)?
            .checked_add(var1.checked_mul(p5)?.checked_mul(1 << 17)?)?
            .checked_add(p4 << 35)?;
        let var1 = (var1.checked_mul(var1)?.checked_mul(p3)? >> 8)
            .checked_add(var1.checked_mul(p2)?.checked_mul(1 << 12)?)?;
        let var1 = (1_i128 << 47).checked_add(var1)?.checked_mul(p1)? >> 33;

        // None on a zero divisor too
        let p = 1_048_576 - i128::from(raw_pressure);
        let p = p
            .checked_mul(1 << 31)?
            .checked_sub(var2)?
            .checked_mul(3125)?
            .checked_div(var1)?;
        let var1 = p9.checked_mul(p >> 13)?.checked_mul(p >> 13)? >> 25;
        let var2 = p8.checked_mul(p)? >> 19;

        Some((p.checked_add(var1)?.checked_add(var2)? >> 8) + (p7 << 4))
    }
}

/// The `t_fine` intermediate of one temperature compensation.
///
/// Only `Calibration::compensate_temperature` makes these, and `compensate_pressure` consumes
/// one, so pressure can not be compensated before the temperature of the same sample.
///
/// ```compile_fail
/// use peripheral_drivers::bmp280::{Calibration, FineTemperature};
///
/// let calibration = Calibration::from_bytes(&[0; 24]);
/// let pressure = calibration.compensate_pressure(415148, FineTemperature(128422.0));
/// ```
///
/// ```compile_fail
/// use peripheral_drivers::bmp280::Calibration;
///
/// let calibration = Calibration::from_bytes(&[0; 24]);
/// let temperature = calibration.compensate_temperature(519888);
/// let first = calibration.compensate_pressure(415148, temperature.fine);
/// // Already consumed by the first pressure compensation.
/// let second = calibration.compensate_pressure(415148, temperature.fine);
/// ```
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct FineTemperature(f64);

impl FineTemperature {
    /// The raw `t_fine` value.
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Result of temperature compensation.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct CompensatedTemperature {
    /// Degrees Celsius.
    pub celsius: f64,
    /// Input for pressure compensation of the same sample.
    pub fine: FineTemperature,
}

/// Raw 20-bit ADC values of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct RawData {
    pub temperature: u32,
    pub pressure: u32,
}

impl RawData {
    /// Unpack the six data registers starting at `press_msb` (0xF7).
    ///
    /// Each value is msb, lsb, xlsb with the low nibble of xlsb unused.
    pub fn from_bytes(data: [u8; 6]) -> Self {
        let pressure = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
        let temperature =
            (u32::from(data[3]) << 16) | (u32::from(data[4]) << 8) | u32::from(data[5]);
        RawData {
            temperature: temperature >> 4,
            pressure: pressure >> 4,
        }
    }
}

/// A compensated reading from the BMP280.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct Reading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// hPa. 0.0 if the calibration data could not produce a pressure.
    pub pressure: f64,
}

/// A BMP280 sensor on the I2C bus `I`.
pub struct Bmp280<I> {
    io: I2cIo<I>,
}

impl<E, I> Bmp280<I>
where
    I: I2c<Error = E>,
{
    /// Create the driver. `address` is `PRIMARY_ADDRESS` or `SECONDARY_ADDRESS` depending on how
    /// SDO is wired.
    ///
    /// Call `init` before anything else. It resets the sensor and reads its calibration.
    pub fn new(i2c: I, address: u8) -> Self {
        Bmp280 {
            io: I2cIo::new(i2c, address),
        }
    }

    /// Reset the sensor, check its id, read the calibration block and start measuring.
    ///
    /// This takes at least 1.5 s. If the sensor does not confirm normal mode it is put in forced
    /// mode instead, see `Bmp280Initialized::mode`.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<Bmp280Initialized<'_, I>, Error<E>> {
        self.io.write(&[reg::RESET], &[RESET_VALUE])?;
        delay.delay_ms(RESET_DELAY_MS);

        let [id]: [u8; 1] = self.io.read(&[reg::ID], 0, delay)?;
        if id != CHIP_ID {
            #[cfg(feature = "use-defmt")]
            defmt::error!("BMP280 id register is {=u8:#x}, expected {=u8:#x}", id, CHIP_ID);
            return Err(Error::UnexpectedDeviceId(id));
        }

        let calibration = self.read_calibration(delay)?;
        let mode = self.configure(delay)?;

        Ok(Bmp280Initialized {
            bmp280: self,
            calibration,
            mode,
        })
    }

    fn read_calibration(&mut self, delay: &mut impl DelayNs) -> Result<Calibration, Error<E>> {
        let buf: [u8; CALIBRATION_LEN] =
            self.io
                .read(&[reg::CALIB_00], CALIBRATION_SETTLE_MS, delay)?;
        Ok(Calibration::from_bytes(&buf))
    }

    /// Ask for normal mode and check that it stuck. Falls back to forced mode if not.
    fn configure(&mut self, delay: &mut impl DelayNs) -> Result<PowerMode, Error<E>> {
        self.io.write(&[reg::CTRL_MEAS], &[CTRL_MEAS_NORMAL])?;
        delay.delay_ms(MODE_SETTLE_MS);

        let [ctrl_meas]: [u8; 1] = self.io.read(&[reg::CTRL_MEAS], 0, delay)?;
        if ctrl_meas == CTRL_MEAS_NORMAL {
            return Ok(PowerMode::Normal);
        }

        self.io.write(&[reg::CTRL_MEAS], &[CTRL_MEAS_FORCED])?;

        #[cfg(feature = "use-defmt")]
        defmt::warn!(
            "BMP280 ctrl_meas reads back {=u8:#x}, switched to forced mode",
            ctrl_meas
        );

        Ok(PowerMode::Forced)
    }

    /// Destroys this driver and releases the I2C bus `I`.
    pub fn destroy(self) -> I {
        self.io.destroy()
    }
}

/// Bmp280Initialized is returned by Bmp280::init() and the sensor is ready to read from.
///
/// It owns the calibration block for as long as it lives.
pub struct Bmp280Initialized<'a, I> {
    bmp280: &'a mut Bmp280<I>,
    calibration: Calibration,
    mode: PowerMode,
}

impl<'a, E, I> Bmp280Initialized<'a, I>
where
    I: I2c<Error = E>,
{
    /// The calibration block read during `init`.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// The mode `init` left the sensor in.
    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    /// Check the status register for a running conversion.
    pub fn is_measuring(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        Self::status_measuring(&mut self.bmp280.io, delay)
    }

    fn status_measuring(io: &mut I2cIo<I>, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        let [status]: [u8; 1] = io.read(&[reg::STATUS], 0, delay)?;
        Ok(status & STATUS_MEASURING != 0)
    }

    /// Wait for the current conversion to finish and read the raw temperature and pressure.
    ///
    /// The status register is checked every 10ms. `deadline` bounds how many times. With
    /// `Deadline::Unbounded` a sensor that never finishes blocks this call forever.
    pub fn read_raw_data(
        &mut self,
        delay: &mut impl DelayNs,
        deadline: Deadline,
    ) -> Result<RawData, Error<E>> {
        if self.mode == PowerMode::Forced {
            // The sensor goes back to sleep after each forced conversion.
            self.bmp280
                .io
                .write(&[reg::CTRL_MEAS], &[CTRL_MEAS_FORCED_X1])?;
        }

        let io = &mut self.bmp280.io;
        poll_until(delay, POLL_INTERVAL_MS, deadline, |delay| {
            Ok(!Self::status_measuring(io, delay)?)
        })?;

        let data: [u8; 6] = io.read(&[reg::PRESS_MSB], 0, delay)?;
        Ok(RawData::from_bytes(data))
    }

    /// Compensate a raw temperature with this sensor's calibration.
    pub fn compensate_temperature(&self, raw_temperature: u32) -> CompensatedTemperature {
        self.calibration.compensate_temperature(raw_temperature)
    }

    /// Compensate a raw pressure with this sensor's calibration, see
    /// `Calibration::compensate_pressure`.
    pub fn compensate_pressure(&self, raw_pressure: u32, fine: FineTemperature) -> f64 {
        self.calibration.compensate_pressure(raw_pressure, fine)
    }

    /// Read one sample and compensate it.
    pub fn read_data(
        &mut self,
        delay: &mut impl DelayNs,
        deadline: Deadline,
    ) -> Result<Reading, Error<E>> {
        let raw = self.read_raw_data(delay, deadline)?;
        let temperature = self.compensate_temperature(raw.temperature);
        let pressure = self.compensate_pressure(raw.pressure, temperature.fine);

        Ok(Reading {
            temperature: temperature.celsius,
            pressure,
        })
    }
}
