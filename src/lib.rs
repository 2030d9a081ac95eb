#![cfg_attr(not(test), no_std)]
//! Drivers for an AHT10 humidity sensor, a BMP280 pressure sensor and a UC1628 LCD controller.
//!
//! All three are written against the `embedded-hal` 1.0 traits. The two sensors sit on an I2C bus
//! and share the small [`I2cIo`] transaction wrapper. The LCD is driven through whatever
//! controller bring-up routine the host provides, see [`LcdController`].
//!
//! Example:
//!
//!     # use embedded_hal_mock::eh1::delay::NoopDelay as MockDelay;
//!     # use embedded_hal_mock::eh1::i2c::Mock as I2cMock;
//!     # use embedded_hal_mock::eh1::i2c::Transaction;
//!     # use peripheral_drivers::aht10::{Aht10, Command, SENSOR_ADDRESS};
//!     # let expectations = vec![
//!     #     // reset
//!     #     Transaction::write(SENSOR_ADDRESS, vec![Command::SoftReset as u8]),
//!     #     // trigger_measurement
//!     #     Transaction::write(
//!     #         SENSOR_ADDRESS,
//!     #         vec![Command::TriggerMeasurement as u8, 0b0011_0011, 0b0000_0000],
//!     #     ),
//!     #     // Six bytes back: status, then 20 bits humidity and 20 bits temperature.
//!     #     Transaction::read(
//!     #         SENSOR_ADDRESS,
//!     #         vec![0b0001_1100, 0x65, 0xb4, 0x25, 0xcd, 0x26],
//!     #     ),
//!     # ];
//!     # let mock_i2c = I2cMock::new(&expectations);
//!     # let mut mock_delay = MockDelay::new();
//!     let mut aht10 = Aht10::new(mock_i2c, SENSOR_ADDRESS);
//!     aht10.reset(&mut mock_delay).unwrap();
//!
//!     // `None` means the sensor reported itself busy. Trigger again later.
//!     if let Some(measurement) = aht10.measure(&mut mock_delay).unwrap() {
//!         println!("temperature (aht10): {:.2}C", measurement.temperature);
//!         println!("humidity (aht10): {:.2}%", measurement.humidity);
//!     }
//!     # aht10.destroy().done();
//!
//! Every wait the datasheets ask for is done through the `DelayNs` you pass in, and every bus
//! call blocks until the transaction completes. None of the drivers lock anything. If several of
//! them share one physical bus, hand each a shared-bus device (for example from
//! `embedded-hal-bus`) or a `&mut` to the bus and serialize the calls yourself.

pub mod aht10;
pub mod bmp280;
pub mod i2c_io;
pub mod poll;
pub mod uc1628;

pub use i2c_io::I2cIo;
pub use poll::Deadline;
pub use uc1628::LcdController;

/// Driver errors.
///
/// `E` is the error type of the underlying bus, or of the [`LcdController`] for the display
/// driver.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// I2C read transaction failed
    Read(E),
    /// I2C write transaction failed
    Write(E),
    /// Register address plus payload do not fit in one write, see
    /// [`i2c_io::MAX_WRITE_LEN`].
    PayloadTooLong,
    /// The identity register did not hold the expected chip id. Contains the id that was read.
    UnexpectedDeviceId(u8),
    /// The caller's [`Deadline`] ran out while waiting for the sensor.
    Timeout,
    /// A custom LCD init table is not a sequence of well formed
    /// `(control type, parameter count, value)` triples.
    InvalidInitSequence,
    /// The blit window has `x0 > x1` or `y0 > y1`.
    InvalidWindow,
    /// The frame buffer handed to the display does not match the window it is written to.
    FrameLength { expected: usize, actual: usize },
    /// The LCD controller bring-up or write routine failed.
    Controller(E),
}
