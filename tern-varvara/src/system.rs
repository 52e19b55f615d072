use log::warn;
use std::{fmt::Write, mem::offset_of};
use uxn::{Ports, Uxn};
use zerocopy::{
    byteorder::{BigEndian, U16},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

#[derive(Default)]
pub struct System {
    exit: Option<i32>,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct Fill {
    length: U16<BigEndian>,
    bank: U16<BigEndian>,
    addr: U16<BigEndian>,
    value: u8,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct Cpy {
    length: U16<BigEndian>,
    src_bank: U16<BigEndian>,
    src_addr: U16<BigEndian>,
    dst_bank: U16<BigEndian>,
    dst_addr: U16<BigEndian>,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SystemPorts {
    _unused_0: u8,
    _unused_1: u8,
    expansion: U16<BigEndian>,
    _wst: u8,
    _rst: u8,
    _metadata: U16<BigEndian>,
    red: U16<BigEndian>,
    green: U16<BigEndian>,
    blue: U16<BigEndian>,
    debug: u8,
    state: u8,
}

impl Ports for SystemPorts {
    const BASE: u8 = 0x00;
}
static_assertions::assert_eq_size!(SystemPorts, [u8; 16]);

impl SystemPorts {
    const EXPANSION: u8 = (offset_of!(Self, expansion) + 1) as u8;
    const RED: u8 = offset_of!(Self, red) as u8;
    const BLUE: u8 = offset_of!(Self, blue) as u8;
    pub const DEBUG: u8 = offset_of!(Self, debug) as u8;
    const STATE: u8 = offset_of!(Self, state) as u8;

    pub const DEI_MASK: u16 = 0x0000;
    pub const DEO_MASK: u16 = 0xff28;

    /// Checks whether the target is one of the six palette bytes
    pub fn is_palette(target: u8) -> bool {
        (Self::RED..Self::BLUE + 2).contains(&target)
    }

    /// Returns the raw palette bytes, as `[red, green, blue]` shorts
    pub fn palette(&self) -> [u8; 6] {
        let [r0, r1] = self.red.get().to_be_bytes();
        let [g0, g1] = self.green.get().to_be_bytes();
        let [b0, b1] = self.blue.get().to_be_bytes();
        [r0, r1, g0, g1, b0, b1]
    }

    /// Checks whether the debug overlay is enabled
    pub fn debug(&self) -> bool {
        self.debug != 0
    }
}

mod expansion {
    pub const FILL: u8 = 0x00;
    pub const CPYL: u8 = 0x01;
    pub const CPYR: u8 = 0x02;
}

/// Reads an expansion command's arguments, which follow the opcode byte
fn read_args<T: IntoBytes + FromBytes>(vm: &Uxn, addr: u16) -> T {
    let mut out = T::new_zeroed();
    for (i, b) in out.as_mut_bytes().iter_mut().enumerate() {
        *b = vm.ram_read_byte(addr.wrapping_add(1).wrapping_add(i as u16));
    }
    out
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes a `DEO` operation against the system device
    ///
    /// Palette and debug ports are handled by the caller, since they affect
    /// other devices.
    pub fn deo(&mut self, vm: &mut Uxn, target: u8) {
        let v = vm.dev::<SystemPorts>();
        match target {
            SystemPorts::EXPANSION => {
                let addr = v.expansion.get();
                self.expansion(vm, addr);
            }
            SystemPorts::STATE => {
                if v.state != 0 {
                    self.exit = Some(i32::from(v.state & 0x7f));
                }
            }
            _ => (),
        }
    }

    fn expansion(&mut self, vm: &mut Uxn, addr: u16) {
        let op = vm.ram_read_byte(addr);
        match op {
            expansion::FILL => {
                let f: Fill = read_args(vm, addr);
                if f.bank.get() != 0 {
                    warn!("fill: unsupported bank {}", f.bank.get());
                    return;
                }
                let start = f.addr.get();
                for i in 0..f.length.get() {
                    vm.ram_write_byte(start.wrapping_add(i), f.value);
                }
            }
            expansion::CPYL | expansion::CPYR => {
                let c: Cpy = read_args(vm, addr);
                if c.src_bank.get() != 0 || c.dst_bank.get() != 0 {
                    warn!(
                        "copy: unsupported banks {} -> {}",
                        c.src_bank.get(),
                        c.dst_bank.get()
                    );
                    return;
                }
                let len = c.length.get();
                let offset = |i: u16, base: u16| {
                    if op == expansion::CPYL {
                        base.wrapping_add(i)
                    } else {
                        base.wrapping_add(len).wrapping_sub(1).wrapping_sub(i)
                    }
                };
                for i in 0..len {
                    let b = vm.ram_read_byte(offset(i, c.src_addr.get()));
                    vm.ram_write_byte(offset(i, c.dst_addr.get()), b);
                }
            }
            _ => warn!("invalid expansion opcode {op:#04x}"),
        }
    }

    /// Returns the exit code, if the VM has requested an exit
    pub fn exit(&self) -> Option<i32> {
        self.exit
    }
}

/// Formats the top of both stacks, e.g. for the debug port
///
/// The `|` marks the bottom of each stack when it holds fewer than 8 bytes.
pub fn inspect(vm: &Uxn) -> String {
    let mut out = String::new();
    for (name, st) in [("WST", vm.stack()), ("RST", vm.ret())] {
        out += name;
        out += " ";
        let n = st.len();
        for i in (0..8).rev() {
            let _ = write!(out, "{:02x}", st.peek_byte_at(i));
            out += if i == n { "|" } else { " " };
        }
        out += "<\n";
    }
    out
}
