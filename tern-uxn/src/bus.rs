//! Device bus: 256 bytes of port memory, split into 16 slots of 16 ports
//!
//! Each slot carries an input and an output mask.  A set bit marks the port
//! as side-effecting, so the access is routed to the [`Device`]; a clear bit
//! means the port is plain storage.
use crate::{Device, Uxn, DEV_SIZE};

/// Per-slot port masks
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct Masks {
    /// Ports which call [`Device::dei`] when read
    pub dei: [u16; 16],
    /// Ports which call [`Device::deo`] when written
    pub deo: [u16; 16],
}

impl Masks {
    #[inline]
    fn test(masks: &[u16; 16], port: u8) -> bool {
        (masks[usize::from(port >> 4)] >> (port & 0xF)) & 1 != 0
    }
}

impl Uxn {
    /// Registers the input and output masks for a device slot
    ///
    /// `slot` is the device index (`0..16`), i.e. the high nibble of its base
    /// address; higher bits are ignored.
    pub fn connect(&mut self, slot: u8, dei_mask: u16, deo_mask: u16) {
        let i = usize::from(slot & 0xF);
        self.masks.dei[i] = dei_mask;
        self.masks.deo[i] = deo_mask;
    }

    /// Returns the `(input, output)` masks for a device slot
    pub fn masks(&self, slot: u8) -> (u16, u16) {
        let i = usize::from(slot & 0xF);
        (self.masks.dei[i], self.masks.deo[i])
    }

    /// Reads a byte from the bus
    ///
    /// Masked ports ask the device for their value; other ports return the
    /// byte stored in port memory.
    #[inline]
    pub fn dei(&mut self, dev: &mut dyn Device, port: u8) -> u8 {
        if Masks::test(&self.masks.dei, port) {
            dev.dei(self, port)
        } else {
            self.dev[usize::from(port)]
        }
    }

    /// Writes a byte to the bus
    ///
    /// The byte is always stored in port memory; masked ports then notify the
    /// device, which reads the value back from port memory.
    #[inline]
    pub fn deo(&mut self, dev: &mut dyn Device, port: u8, value: u8) {
        self.dev[usize::from(port)] = value;
        if Masks::test(&self.masks.deo, port) {
            dev.deo(self, port);
        }
    }

    /// Reads a byte from port memory, bypassing the device
    #[inline]
    pub fn read_dev_mem(&self, addr: u8) -> u8 {
        self.dev[usize::from(addr)]
    }

    /// Writes a byte to port memory, bypassing the device
    #[inline]
    pub fn write_dev_mem(&mut self, addr: u8, value: u8) {
        self.dev[usize::from(addr)] = value;
    }

    /// Reads a big-endian short from port memory
    ///
    /// The second byte wraps around to port `0x00`.
    #[inline]
    pub fn read_dev_short(&self, addr: u8) -> u16 {
        let hi = self.read_dev_mem(addr);
        let lo = self.read_dev_mem(addr.wrapping_add(1));
        u16::from_be_bytes([hi, lo])
    }

    /// Borrows the 16 ports of the slot containing `addr`
    #[inline]
    pub fn dev_slot(&self, addr: u8) -> &[u8] {
        &self.dev[usize::from(addr & 0xF0)..][..DEV_SIZE]
    }
}
