use std::mem::offset_of;
use uxn::{Ports, Uxn};
use zerocopy::{
    byteorder::{BigEndian, U16},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

#[derive(Default)]
pub struct Console {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ConsolePorts {
    vector: U16<BigEndian>,
    read: u8,
    _pad_0: [u8; 4],
    type_: u8,
    write: u8,
    error: u8,
    _pad_1: [u8; 6],
}

impl Ports for ConsolePorts {
    const BASE: u8 = 0x10;
}
static_assertions::assert_eq_size!(ConsolePorts, [u8; 16]);

impl ConsolePorts {
    const WRITE: u8 = Self::BASE | offset_of!(Self, write) as u8;
    const ERROR: u8 = Self::BASE | offset_of!(Self, error) as u8;

    pub const DEI_MASK: u16 = 0x0000;
    pub const DEO_MASK: u16 = 0x0300;
}

/// Kind of byte delivered to the console vector
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Type {
    /// A byte read from standard input
    Stdin = 1,
    /// A byte of a command-line argument
    Argument = 2,
    /// Separator between two arguments
    ArgumentSpacer = 3,
    /// Terminator after the last argument
    ArgumentEnd = 4,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deo(&mut self, vm: &mut Uxn, target: u8) {
        let v = vm.dev::<ConsolePorts>();
        match target {
            ConsolePorts::WRITE => self.stdout.push(v.write),
            ConsolePorts::ERROR => self.stderr.push(v.error),
            _ => (),
        }
    }

    /// Stores an incoming byte in the ports, returning the console vector
    pub fn input(&mut self, vm: &mut Uxn, c: u8, ty: Type) -> u16 {
        let p = vm.dev_mut::<ConsolePorts>();
        p.read = c;
        p.type_ = ty as u8;
        p.vector.get()
    }

    /// Sets the type port without delivering a byte
    pub fn set_type(&mut self, vm: &mut Uxn, ty: Type) {
        vm.dev_mut::<ConsolePorts>().type_ = ty as u8;
    }

    /// Appends text to the `stderr` buffer
    pub fn write_stderr(&mut self, s: &str) {
        self.stderr.extend_from_slice(s.as_bytes());
    }

    /// Takes the `stdout` buffer, leaving it empty
    pub fn stdout(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.stdout)
    }

    /// Takes the `stderr` buffer, leaving it empty
    pub fn stderr(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.stderr)
    }
}
