//! Register-style read and write transactions for one device on an I2C bus.
//!
//! Both sensors in this crate talk to the bus through [`I2cIo`]. It knows the device address,
//! turns bus failures into [`Error::Read`] or [`Error::Write`], and never retries.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::Error;

/// Longest register address plus payload that [`I2cIo::write`] sends in one transaction.
pub const MAX_WRITE_LEN: usize = 32;

/// A device at `address` on the I2C bus `I`.
pub struct I2cIo<I> {
    i2c: I,
    address: u8,
}

impl<E, I> I2cIo<I>
where
    I: I2c<Error = E>,
{
    /// Wrap the bus `I`. `address` is the 7-bit address of the device.
    pub fn new(i2c: I, address: u8) -> Self {
        I2cIo { i2c, address }
    }

    /// The device address this wrapper talks to.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read `N` bytes starting at `register`.
    ///
    /// With `settle_ms` at 0 this is a single write-read transaction with a repeated start.
    /// Otherwise the register address is written, the bus is left idle for `settle_ms`, and the
    /// data is read in a second transaction. An empty `register` skips the address write, which
    /// is what sensors that answer a previous command without a register map want.
    pub fn read<const N: usize>(
        &mut self,
        register: &[u8],
        settle_ms: u32,
        delay: &mut impl DelayNs,
    ) -> Result<[u8; N], Error<E>> {
        const { assert!(N > 0, "a read must ask for at least one byte") };

        let mut buffer = [0u8; N];
        if register.is_empty() {
            self.i2c
                .read(self.address, &mut buffer)
                .map_err(Error::Read)?;
        } else if settle_ms == 0 {
            self.i2c
                .write_read(self.address, register, &mut buffer)
                .map_err(Error::Read)?;
        } else {
            self.i2c.write(self.address, register).map_err(Error::Read)?;
            delay.delay_ms(settle_ms);
            self.i2c
                .read(self.address, &mut buffer)
                .map_err(Error::Read)?;
        }

        Ok(buffer)
    }

    /// Write `payload` to `register` in one transaction.
    ///
    /// Commands without a register are sent by passing the command bytes as `register` and an
    /// empty payload.
    pub fn write(&mut self, register: &[u8], payload: &[u8]) -> Result<(), Error<E>> {
        let len = register.len() + payload.len();
        if len > MAX_WRITE_LEN {
            return Err(Error::PayloadTooLong);
        }

        let mut buffer = [0u8; MAX_WRITE_LEN];
        buffer[..register.len()].copy_from_slice(register);
        buffer[register.len()..len].copy_from_slice(payload);

        self.i2c
            .write(self.address, &buffer[..len])
            .map_err(Error::Write)
    }

    /// Destroys this wrapper and releases the I2C bus `I`.
    pub fn destroy(self) -> I {
        self.i2c
    }
}
