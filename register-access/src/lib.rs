#![cfg_attr(not(test), no_std)]

//! Byte-wide register transport used by peripheral drivers.
//!
//! Registers are addressed with a 16 bit bus address. Multi-byte accesses
//! touch consecutive addresses, starting at the given one.

use embedded_hal::i2c::{I2c, Operation};

pub trait RegisterAccess {
    type Error;

    /// Reads `buffer.len()` consecutive registers starting at `address`.
    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `data` to consecutive registers starting at `address`.
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error>;

    /// Updates the bits selected by `mask` to the corresponding bits of `value`.
    ///
    /// The default implementation is a read-modify-write of a single register.
    /// Transports with a native masked write should override it.
    fn masked_write(&mut self, address: u16, mask: u8, value: u8) -> Result<(), Self::Error> {
        let mut current = [0];
        self.read(address, &mut current)?;

        let updated = (current[0] & !mask) | (value & mask);
        self.write(address, &[updated])
    }

    fn read_u8(&mut self, address: u16) -> Result<u8, Self::Error> {
        let mut value = [0];
        self.read(address, &mut value)?;
        Ok(value[0])
    }

    fn write_u8(&mut self, address: u16, value: u8) -> Result<(), Self::Error> {
        self.write(address, &[value])
    }
}

impl<T> RegisterAccess for &mut T
where
    T: RegisterAccess + ?Sized,
{
    type Error = T::Error;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        T::read(self, address, buffer)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        T::write(self, address, data)
    }

    fn masked_write(&mut self, address: u16, mask: u8, value: u8) -> Result<(), Self::Error> {
        T::masked_write(self, address, mask, value)
    }
}

/// Register transport over an I2C device that takes a big-endian 16 bit
/// register address before the data bytes.
pub struct I2cRegisterAccess<I> {
    pub i2c: I,
    device_address: u8,
}

impl<I> I2cRegisterAccess<I> {
    pub const fn new(i2c: I, device_address: u8) -> Self {
        Self {
            i2c,
            device_address,
        }
    }

    pub fn into_inner(self) -> I {
        self.i2c
    }
}

impl<I> RegisterAccess for I2cRegisterAccess<I>
where
    I: I2c,
{
    type Error = I::Error;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c
            .write_read(self.device_address, &address.to_be_bytes(), buffer)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        self.i2c.transaction(
            self.device_address,
            &mut [
                Operation::Write(&address.to_be_bytes()),
                Operation::Write(data),
            ],
        )
    }
}
