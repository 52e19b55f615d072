//! Uxn virtual machine
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

extern crate alloc;

mod bus;
mod stack;

pub use stack::{Stack, STACK_SIZE};

use bus::Masks;
use stack::{StackView, Value};

pub(crate) const fn keep(flags: u8) -> bool {
    (flags & (1 << 2)) != 0
}
pub(crate) const fn short(flags: u8) -> bool {
    (flags & (1 << 0)) != 0
}
pub(crate) const fn ret(flags: u8) -> bool {
    (flags & (1 << 1)) != 0
}

/// Size of a device in port memory
pub const DEV_SIZE: usize = 16;

/// Address at which ROMs are loaded and the reset vector begins
pub const PAGE_PROGRAM: u16 = 0x0100;

/// Port holding the system halt flag
///
/// While this byte is non-zero, [`Uxn::eval`] refuses to run.
pub const HALT_PORT: u8 = 0x0f;

/// Kind of fault raised by the CPU
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Popped from an empty stack
    StackUnderflow,
    /// Pushed to a full stack
    StackOverflow,
    /// Divided by zero
    DivideByZero,
}

impl FaultKind {
    /// Numeric error code, as reported by the reference emulator
    pub fn code(&self) -> u8 {
        match self {
            FaultKind::StackUnderflow => 1,
            FaultKind::StackOverflow => 2,
            FaultKind::DivideByZero => 3,
        }
    }
}

impl core::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FaultKind::StackUnderflow => "stack underflow",
            FaultKind::StackOverflow => "stack overflow",
            FaultKind::DivideByZero => "division by zero",
        };
        f.write_str(s)
    }
}

impl core::error::Error for FaultKind {}

/// A fault which stopped evaluation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    /// Instruction byte being executed
    pub instr: u8,
    /// What went wrong
    pub kind: FaultKind,
    /// Address of the faulting instruction
    pub addr: u16,
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} at {:#06x} (instruction {:#04x})",
            self.kind, self.addr, self.instr
        )
    }
}

impl core::error::Error for Fault {}

/// Result of a single opcode
///
/// `Ok(Some(pc))` continues at `pc`, `Ok(None)` is a `BRK`.
type OpResult = Result<Option<u16>, FaultKind>;

/// The virtual machine itself
pub struct Uxn {
    /// Device memory
    dev: [u8; 256],
    /// Port masks for each device slot
    masks: Masks,
    /// 64 KiB of VM memory
    ram: UxnRam,
    /// 255-byte data stack
    stack: Stack,
    /// 255-byte return stack
    ret: Stack,
}

impl Default for Uxn {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! op_cmp {
    ($self:ident, $flags:ident, $f:expr) => {{
        let mut s = $self.stack_view::<{ $flags }>();
        let v = if short($flags) {
            let b = s.pop_short()?;
            let a = s.pop_short()?;
            let f: fn(u16, u16) -> bool = $f;
            f(a, b)
        } else {
            let b = s.pop_byte()?;
            let a = s.pop_byte()?;
            let f: fn(u8, u8) -> bool = $f;
            f(a, b)
        };
        s.push_byte(v as u8)?;
    }};
}

macro_rules! op_bin {
    ($self:ident, $flags:ident, $f:expr) => {{
        let mut s = $self.stack_view::<{ $flags }>();
        if short($flags) {
            let b = s.pop_short()?;
            let a = s.pop_short()?;
            let f: fn(u16, u16) -> u16 = $f;
            s.push_short(f(a, b))?;
        } else {
            let b = s.pop_byte()?;
            let a = s.pop_byte()?;
            let f: fn(u8, u8) -> u8 = $f;
            s.push_byte(f(a, b))?;
        }
    }};
}

impl Uxn {
    /// Boots a new `Uxn`, with zeroed memory, stacks, and ports
    pub fn new() -> Self {
        Self {
            dev: [0u8; 256],
            masks: Masks::default(),
            ram: UxnRam::new(),
            stack: Stack::default(),
            ret: Stack::default(),
        }
    }

    /// Replaces memory with a fresh zeroed buffer and loads a ROM at `0x100`
    ///
    /// Stacks and port memory are left alone.  Returns the tail of the ROM
    /// which did not fit in memory (empty for ordinary ROMs).
    pub fn load<'b>(&mut self, rom: &'b [u8]) -> &'b [u8] {
        self.ram = UxnRam::new();
        let start = usize::from(PAGE_PROGRAM);
        let n = rom.len().min(self.ram.len() - start);
        self.ram[start..][..n].copy_from_slice(&rom[..n]);
        &rom[n..]
    }

    /// Reads a byte from RAM at the program counter
    #[inline]
    fn next(&self, pc: &mut u16) -> u8 {
        let out = self.ram[usize::from(*pc)];
        *pc = pc.wrapping_add(1);
        out
    }

    /// Reads a word from RAM at the program counter
    #[inline]
    fn next2(&self, pc: &mut u16) -> u16 {
        let hi = self.next(pc);
        let lo = self.next(pc);
        u16::from_be_bytes([hi, lo])
    }

    #[inline]
    fn ram_write(&mut self, addr: u16, v: Value) {
        match v {
            Value::Short(v) => {
                let [hi, lo] = v.to_be_bytes();
                self.ram[usize::from(addr)] = hi;
                self.ram[usize::from(addr.wrapping_add(1))] = lo;
            }
            Value::Byte(v) => {
                self.ram[usize::from(addr)] = v;
            }
        }
    }

    fn ram_read<const FLAGS: u8>(&self, addr: u16) -> Value {
        if short(FLAGS) {
            Value::Short(self.ram_read_word(addr))
        } else {
            Value::Byte(self.ram_read_byte(addr))
        }
    }

    #[inline]
    fn stack_view<const FLAGS: u8>(&mut self) -> StackView<'_, FLAGS> {
        let stack = if ret(FLAGS) {
            &mut self.ret
        } else {
            &mut self.stack
        };
        StackView::new(stack)
    }

    /// Returns a view of the stack opposite to the one selected by `FLAGS`
    #[inline]
    fn ret_stack_view<const FLAGS: u8>(&mut self) -> StackView<'_, FLAGS> {
        let stack = if ret(FLAGS) {
            &mut self.stack
        } else {
            &mut self.ret
        };
        StackView::new(stack)
    }

    #[inline]
    fn check_dev_size<D: Ports>() {
        struct AssertDevSize<D>(D);
        impl<D> AssertDevSize<D> {
            const ASSERT: () = if core::mem::size_of::<D>() != DEV_SIZE {
                panic!("dev must be 16 bytes");
            };
        }
        AssertDevSize::<D>::ASSERT
    }

    /// Converts raw ports memory into a [`Ports`] object
    #[inline]
    pub fn dev<D: Ports>(&self) -> &D {
        Self::check_dev_size::<D>();
        // Size is checked at compile time and `Ports` types are unaligned,
        // so the cast cannot fail.
        D::ref_from_bytes(self.dev_slot(D::BASE))
            .expect("ports must be 16 unaligned bytes")
    }

    /// Returns a mutable reference to the given [`Ports`] object
    #[inline]
    pub fn dev_mut<D: Ports>(&mut self) -> &mut D {
        Self::check_dev_size::<D>();
        let base = usize::from(D::BASE & 0xF0);
        D::mut_from_bytes(&mut self.dev[base..][..DEV_SIZE])
            .expect("ports must be 16 unaligned bytes")
    }

    /// Mutably borrows the entire RAM array
    #[inline]
    pub fn ram_mut(&mut self) -> &mut [u8; 65536] {
        &mut self.ram
    }

    /// Shared borrow of the entire RAM array
    #[inline]
    pub fn ram(&self) -> &[u8; 65536] {
        &self.ram
    }

    /// Reads a byte from RAM
    #[inline]
    pub fn ram_read_byte(&self, addr: u16) -> u8 {
        self.ram[usize::from(addr)]
    }

    /// Writes a byte to RAM
    #[inline]
    pub fn ram_write_byte(&mut self, addr: u16, v: u8) {
        self.ram[usize::from(addr)] = v;
    }

    /// Reads a word from RAM
    ///
    /// If the address is at the top of RAM, the second byte will wrap to 0
    #[inline]
    pub fn ram_read_word(&self, addr: u16) -> u16 {
        let hi = self.ram[usize::from(addr)];
        let lo = self.ram[usize::from(addr.wrapping_add(1))];
        u16::from_be_bytes([hi, lo])
    }

    /// Shared borrow of the working stack
    #[inline]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Mutable borrow of the working stack
    #[inline]
    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    /// Shared borrow of the return stack
    #[inline]
    pub fn ret(&self) -> &Stack {
        &self.ret
    }

    /// Mutable borrow of the return stack
    #[inline]
    pub fn ret_mut(&mut self) -> &mut Stack {
        &mut self.ret
    }

    /// Checks whether the halt flag is set
    #[inline]
    pub fn halted(&self) -> bool {
        self.dev[usize::from(HALT_PORT)] != 0
    }

    /// Runs the VM starting at the given address until it terminates
    ///
    /// Returns `false` without executing anything if `pc` is zero or the halt
    /// flag is set, and `true` when a `BRK` is reached.  If an instruction
    /// faults, evaluation stops and the result of [`Device::halt`] is
    /// returned; the stacks and memory are left as they were at the fault.
    pub fn eval<D: Device>(&mut self, dev: &mut D, mut pc: u16) -> bool {
        if pc == 0 || self.halted() {
            return false;
        }
        loop {
            let op = self.next(&mut pc);
            match self.op(op, dev, pc) {
                Ok(Some(next)) => pc = next,
                Ok(None) => return true,
                Err(kind) => {
                    let fault = Fault {
                        instr: op,
                        kind,
                        addr: pc.wrapping_sub(1),
                    };
                    return dev.halt(self, fault);
                }
            }
        }
    }

    /// Executes a single operation
    ///
    /// The low five bits select the opcode and the high three bits are mode
    /// flags.  An opcode of zero picks one of the immediate opcodes based on
    /// the flags instead of a mode of `BRK`.
    #[inline]
    fn op(&mut self, instr: u8, dev: &mut dyn Device, pc: u16) -> OpResult {
        if instr & 0x1f == 0 {
            match instr >> 5 {
                0b000 => op::brk(self, dev, pc),
                0b001 => op::jci(self, dev, pc),
                0b010 => op::jmi(self, dev, pc),
                0b011 => op::jsi(self, dev, pc),
                0b100 => op::lit::<0b100>(self, dev, pc),
                0b101 => op::lit::<0b101>(self, dev, pc),
                0b110 => op::lit::<0b110>(self, dev, pc),
                _ => op::lit::<0b111>(self, dev, pc),
            }
        } else {
            match instr >> 5 {
                0b000 => self.alu::<0b000>(instr, dev, pc),
                0b001 => self.alu::<0b001>(instr, dev, pc),
                0b010 => self.alu::<0b010>(instr, dev, pc),
                0b011 => self.alu::<0b011>(instr, dev, pc),
                0b100 => self.alu::<0b100>(instr, dev, pc),
                0b101 => self.alu::<0b101>(instr, dev, pc),
                0b110 => self.alu::<0b110>(instr, dev, pc),
                _ => self.alu::<0b111>(instr, dev, pc),
            }
        }
    }

    /// Executes one of the 31 moded opcodes
    #[inline]
    fn alu<const FLAGS: u8>(
        &mut self,
        instr: u8,
        dev: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        match instr & 0x1f {
            0x01 => op::inc::<FLAGS>(self, dev, pc),
            0x02 => op::pop::<FLAGS>(self, dev, pc),
            0x03 => op::nip::<FLAGS>(self, dev, pc),
            0x04 => op::swp::<FLAGS>(self, dev, pc),
            0x05 => op::rot::<FLAGS>(self, dev, pc),
            0x06 => op::dup::<FLAGS>(self, dev, pc),
            0x07 => op::ovr::<FLAGS>(self, dev, pc),
            0x08 => op::equ::<FLAGS>(self, dev, pc),
            0x09 => op::neq::<FLAGS>(self, dev, pc),
            0x0a => op::gth::<FLAGS>(self, dev, pc),
            0x0b => op::lth::<FLAGS>(self, dev, pc),
            0x0c => op::jmp::<FLAGS>(self, dev, pc),
            0x0d => op::jcn::<FLAGS>(self, dev, pc),
            0x0e => op::jsr::<FLAGS>(self, dev, pc),
            0x0f => op::sth::<FLAGS>(self, dev, pc),
            0x10 => op::ldz::<FLAGS>(self, dev, pc),
            0x11 => op::stz::<FLAGS>(self, dev, pc),
            0x12 => op::ldr::<FLAGS>(self, dev, pc),
            0x13 => op::str::<FLAGS>(self, dev, pc),
            0x14 => op::lda::<FLAGS>(self, dev, pc),
            0x15 => op::sta::<FLAGS>(self, dev, pc),
            0x16 => op::dei::<FLAGS>(self, dev, pc),
            0x17 => op::deo::<FLAGS>(self, dev, pc),
            0x18 => op::add::<FLAGS>(self, dev, pc),
            0x19 => op::sub::<FLAGS>(self, dev, pc),
            0x1a => op::mul::<FLAGS>(self, dev, pc),
            0x1b => op::div::<FLAGS>(self, dev, pc),
            0x1c => op::and::<FLAGS>(self, dev, pc),
            0x1d => op::ora::<FLAGS>(self, dev, pc),
            0x1e => op::eor::<FLAGS>(self, dev, pc),
            // 0x1f; zero never reaches this table
            _ => op::sft::<FLAGS>(self, dev, pc),
        }
    }
}

mod op {
    use super::*;

    /// Computes a jump, either relative (signed) or absolute
    #[inline]
    fn jump_offset(pc: u16, v: Value) -> u16 {
        match v {
            Value::Short(dst) => dst,
            Value::Byte(offset) => {
                let offset = i16::from(offset as i8);
                pc.wrapping_add_signed(offset)
            }
        }
    }

    /// Break
    /// ```text
    /// BRK --
    /// ```
    ///
    /// Ends the evaluation of the current vector. This opcode has no modes.
    #[inline]
    pub fn brk(_: &mut Uxn, _: &mut dyn Device, _: u16) -> OpResult {
        Ok(None)
    }

    /// Jump Conditional Instant
    ///
    /// ```text
    /// JCI cond8 --
    /// ```
    ///
    /// Pops a byte from the working stack; if it is not zero, adds the next
    /// short in memory to `PC+2`, otherwise just skips that short.
    #[inline]
    pub fn jci(vm: &mut Uxn, _: &mut dyn Device, mut pc: u16) -> OpResult {
        let cond = vm.stack.pop_byte()?;
        let dt = vm.next2(&mut pc);
        Ok(Some(if cond != 0 { pc.wrapping_add(dt) } else { pc }))
    }

    /// Jump Instant
    ///
    /// JMI  -- Moves the PC by the next short in memory, relative to `PC+2`.
    #[inline]
    pub fn jmi(vm: &mut Uxn, _: &mut dyn Device, mut pc: u16) -> OpResult {
        let dt = vm.next2(&mut pc);
        Ok(Some(pc.wrapping_add(dt)))
    }

    /// Jump Stash Return Instant
    ///
    /// ```text
    /// JSI  --
    /// ```
    ///
    /// Pushes `PC+2` to the return stack, then jumps as `JMI`.
    #[inline]
    pub fn jsi(vm: &mut Uxn, _: &mut dyn Device, mut pc: u16) -> OpResult {
        let dt = vm.next2(&mut pc);
        vm.ret.push_short(pc)?;
        Ok(Some(pc.wrapping_add(dt)))
    }

    /// Literal
    ///
    /// ```text
    /// LIT -- a
    /// ```
    ///
    /// Pushes the next byte (or short, in `2` mode) in memory and skips over
    /// it.  The `r` flag picks the return stack.
    ///
    /// ```text
    /// LIT 12          ( 12 )
    /// LIT2 abcd       ( ab cd )
    /// ```
    #[inline]
    pub fn lit<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        mut pc: u16,
    ) -> OpResult {
        let v = if short(FLAGS) {
            Value::Short(vm.next2(&mut pc))
        } else {
            Value::Byte(vm.next(&mut pc))
        };
        vm.stack_view::<FLAGS>().push(v)?;
        Ok(Some(pc))
    }

    /// Increment
    ///
    /// ```text
    /// INC a -- a+1
    /// ```
    #[inline]
    pub fn inc<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let v = s.pop()?;
        s.push(v.wrapping_add(1))?;
        Ok(Some(pc))
    }

    /// Pop
    ///
    /// ```text
    /// POP a --
    /// ```
    #[inline]
    pub fn pop<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        vm.stack_view::<FLAGS>().pop()?;
        Ok(Some(pc))
    }

    /// Nip
    ///
    /// ```text
    /// NIP a b -- b
    /// ```
    ///
    /// Removes the second value from the stack.
    #[inline]
    pub fn nip<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let v = s.pop()?;
        s.pop()?;
        s.push(v)?;
        Ok(Some(pc))
    }

    /// Swap
    ///
    /// ```text
    /// SWP a b -- b a
    /// ```
    #[inline]
    pub fn swp<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let b = s.pop()?;
        let a = s.pop()?;
        s.push(b)?;
        s.push(a)?;
        Ok(Some(pc))
    }

    /// Rotate
    ///
    /// ```text
    /// ROT a b c -- b c a
    /// ```
    ///
    /// Rotates the top three values to the left, wrapping around.
    #[inline]
    pub fn rot<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let c = s.pop()?;
        let b = s.pop()?;
        let a = s.pop()?;
        s.push(b)?;
        s.push(c)?;
        s.push(a)?;
        Ok(Some(pc))
    }

    /// Duplicate
    ///
    /// ```text
    /// DUP a -- a a
    /// ```
    #[inline]
    pub fn dup<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let v = s.pop()?;
        s.push(v)?;
        s.push(v)?;
        Ok(Some(pc))
    }

    /// Over
    ///
    /// ```text
    /// OVR a b -- a b a
    /// ```
    #[inline]
    pub fn ovr<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let b = s.pop()?;
        let a = s.pop()?;
        s.push(a)?;
        s.push(b)?;
        s.push(a)?;
        Ok(Some(pc))
    }

    /// Equal
    ///
    /// ```text
    /// EQU a b -- bool8
    /// ```
    ///
    /// The result is always a single byte, even in `2` mode.
    #[inline]
    pub fn equ<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_cmp!(vm, FLAGS, |a, b| a == b);
        Ok(Some(pc))
    }

    /// Not Equal
    ///
    /// ```text
    /// NEQ a b -- bool8
    /// ```
    #[inline]
    pub fn neq<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_cmp!(vm, FLAGS, |a, b| a != b);
        Ok(Some(pc))
    }

    /// Greater Than
    ///
    /// ```text
    /// GTH a b -- bool8
    /// ```
    #[inline]
    pub fn gth<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_cmp!(vm, FLAGS, |a, b| a > b);
        Ok(Some(pc))
    }

    /// Lesser Than
    ///
    /// ```text
    /// LTH a b -- bool8
    /// ```
    #[inline]
    pub fn lth<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_cmp!(vm, FLAGS, |a, b| a < b);
        Ok(Some(pc))
    }

    /// Jump
    ///
    /// ```text
    /// JMP addr --
    /// ```
    ///
    /// Moves the PC by a relative distance equal to the signed byte on the top
    /// of the stack, or to an absolute address in short mode.
    #[inline]
    pub fn jmp<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let dst = vm.stack_view::<FLAGS>().pop()?;
        Ok(Some(jump_offset(pc, dst)))
    }

    /// Jump Conditional
    ///
    /// ```text
    /// JCN cond8 addr --
    /// ```
    ///
    /// Jumps as `JMP` if the byte below the address is not `00`.
    #[inline]
    pub fn jcn<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let dst = s.pop()?;
        let cond = s.pop_byte()?;
        Ok(Some(if cond != 0 { jump_offset(pc, dst) } else { pc }))
    }

    /// Jump Stash Return
    ///
    /// ```text
    /// JSR addr -- | ret16
    /// ```
    ///
    /// Pushes the `PC` to the opposite stack (the return stack, unless in `r`
    /// mode) and jumps as `JMP`.
    ///
    /// ```text
    /// ,&get JSR #01 BRK &get #02 JMP2r  ( 02 01 )
    /// ```
    #[inline]
    pub fn jsr<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let dst = vm.stack_view::<FLAGS>().pop()?;
        vm.ret_stack_view::<FLAGS>().push_short(pc)?;
        Ok(Some(jump_offset(pc, dst)))
    }

    /// Stash
    ///
    /// ```text
    /// STH a -- | a
    /// ```
    ///
    /// Moves the value at the top of the stack to the return stack. Note that
    /// with the `r`-mode, the stacks are exchanged and the value is moved from
    /// the return stack to the working stack.
    #[inline]
    pub fn sth<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let v = vm.stack_view::<FLAGS>().pop()?;
        vm.ret_stack_view::<FLAGS>().push(v)?;
        Ok(Some(pc))
    }

    /// Load Zero-Page
    ///
    /// ```text
    /// LDZ addr8 -- value
    /// ```
    /// Pushes the value at an address within the first 256 bytes of memory.
    /// A short read at `0xff` takes its second byte from `0x100`.
    #[inline]
    pub fn ldz<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let addr = vm.stack_view::<FLAGS>().pop_byte()?;
        let v = vm.ram_read::<FLAGS>(u16::from(addr));
        vm.stack_view::<FLAGS>().push(v)?;
        Ok(Some(pc))
    }

    /// Store Zero-Page
    ///
    /// ```text
    /// STZ val addr8 --
    /// ```
    #[inline]
    pub fn stz<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let addr = s.pop_byte()?;
        let v = s.pop()?;
        vm.ram_write(u16::from(addr), v);
        Ok(Some(pc))
    }

    /// Load Relative
    ///
    /// ```text
    /// LDR addr8 -- value
    /// ```
    ///
    /// Pushes a value at a signed offset (-128 to +127) from the PC.
    #[inline]
    pub fn ldr<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let offset = vm.stack_view::<FLAGS>().pop_byte()? as i8;
        let addr = pc.wrapping_add_signed(i16::from(offset));
        let v = vm.ram_read::<FLAGS>(addr);
        vm.stack_view::<FLAGS>().push(v)?;
        Ok(Some(pc))
    }

    /// Store Relative
    ///
    /// ```text
    /// STR val addr8 --
    /// ```
    #[inline]
    pub fn str<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let offset = s.pop_byte()? as i8;
        let v = s.pop()?;
        let addr = pc.wrapping_add_signed(i16::from(offset));
        vm.ram_write(addr, v);
        Ok(Some(pc))
    }

    /// Load Absolute
    ///
    /// ```text
    /// LDA addr16 -- value
    /// ```
    #[inline]
    pub fn lda<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let addr = vm.stack_view::<FLAGS>().pop_short()?;
        let v = vm.ram_read::<FLAGS>(addr);
        vm.stack_view::<FLAGS>().push(v)?;
        Ok(Some(pc))
    }

    /// Store Absolute
    ///
    /// ```text
    /// STA val addr16 --
    /// ```
    #[inline]
    pub fn sta<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let addr = s.pop_short()?;
        let v = s.pop()?;
        vm.ram_write(addr, v);
        Ok(Some(pc))
    }

    /// Device Input
    ///
    /// ```text
    /// DEI device8 -- value
    /// ```
    ///
    /// Pushes a value read from the device bus.  In short mode, the high byte
    /// comes from `device8` and the low byte from the next port (wrapping
    /// within port memory).
    #[inline]
    pub fn dei<const FLAGS: u8>(
        vm: &mut Uxn,
        dev: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let i = vm.stack_view::<FLAGS>().pop_byte()?;
        let v = if short(FLAGS) {
            let hi = vm.dei(dev, i);
            let lo = vm.dei(dev, i.wrapping_add(1));
            Value::Short(u16::from_be_bytes([hi, lo]))
        } else {
            Value::Byte(vm.dei(dev, i))
        };
        vm.stack_view::<FLAGS>().push(v)?;
        Ok(Some(pc))
    }

    /// Device Output
    ///
    /// ```text
    /// DEO val device8 --
    /// ```
    ///
    /// Writes a value to the device bus, high byte first in short mode.
    #[inline]
    pub fn deo<const FLAGS: u8>(
        vm: &mut Uxn,
        dev: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let i = s.pop_byte()?;
        match s.pop()? {
            Value::Short(v) => {
                let [hi, lo] = v.to_be_bytes();
                vm.deo(dev, i, hi);
                vm.deo(dev, i.wrapping_add(1), lo);
            }
            Value::Byte(v) => vm.deo(dev, i, v),
        }
        Ok(Some(pc))
    }

    /// Add
    ///
    /// ```text
    /// ADD a b -- a+b
    /// ```
    ///
    /// ```text
    /// #1a #2e ADD       ( 48 )
    /// #02 #5d ADDk      ( 02 5d 5f )
    /// #0001 #0002 ADD2  ( 00 03 )
    /// ```
    #[inline]
    pub fn add<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_bin!(vm, FLAGS, |a, b| a.wrapping_add(b));
        Ok(Some(pc))
    }

    /// Subtract
    ///
    /// ```text
    /// SUB a b -- a-b
    /// ```
    #[inline]
    pub fn sub<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_bin!(vm, FLAGS, |a, b| a.wrapping_sub(b));
        Ok(Some(pc))
    }

    /// Multiply
    ///
    /// ```text
    /// MUL a b -- a*b
    /// ```
    #[inline]
    pub fn mul<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_bin!(vm, FLAGS, |a, b| a.wrapping_mul(b));
        Ok(Some(pc))
    }

    /// Divide
    ///
    /// ```text
    /// DIV a b -- a/b
    /// ```
    ///
    /// Pushes the quotient of the first value over the second, rounding
    /// toward zero.  Dividing by zero is a fault, raised after both operands
    /// have been popped.
    ///
    /// ```text
    /// #10 #02 DIV       ( 08 )
    /// #10 #03 DIVk      ( 10 03 05 )
    /// ```
    #[inline]
    pub fn div<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let b = s.pop()?;
        let a = s.pop()?;
        let v = match (a, b) {
            (Value::Short(a), Value::Short(b)) => {
                Value::Short(a.checked_div(b).ok_or(FaultKind::DivideByZero)?)
            }
            (a, b) => {
                let (a, b) = (u16::from(a) as u8, u16::from(b) as u8);
                Value::Byte(a.checked_div(b).ok_or(FaultKind::DivideByZero)?)
            }
        };
        s.push(v)?;
        Ok(Some(pc))
    }

    /// And
    ///
    /// ```text
    /// AND a b -- a&b
    /// ```
    #[inline]
    pub fn and<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_bin!(vm, FLAGS, |a, b| a & b);
        Ok(Some(pc))
    }

    /// Or
    ///
    /// ```text
    /// ORA a b -- a|b
    /// ```
    #[inline]
    pub fn ora<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_bin!(vm, FLAGS, |a, b| a | b);
        Ok(Some(pc))
    }

    /// Exclusive Or
    ///
    /// ```text
    /// EOR a b -- a^b
    /// ```
    #[inline]
    pub fn eor<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        op_bin!(vm, FLAGS, |a, b| a ^ b);
        Ok(Some(pc))
    }

    /// Shift
    ///
    /// ```text
    /// SFT a shift8 -- c
    /// ```
    ///
    /// The low nibble of the control byte is a right shift, applied first; the
    /// high nibble is a left shift.  Bits shifted past the cell width are
    /// lost, so a shift of 8 or more clears a byte.
    ///
    /// ```text
    /// #34 #10 SFT        ( 68 )
    /// #34 #01 SFT        ( 1a )
    /// #1248 #34 SFT2k    ( 12 48 34 09 20 )
    /// ```
    #[inline]
    pub fn sft<const FLAGS: u8>(
        vm: &mut Uxn,
        _: &mut dyn Device,
        pc: u16,
    ) -> OpResult {
        let mut s = vm.stack_view::<FLAGS>();
        let shift = s.pop_byte()?;
        let shr = u32::from(shift & 0xF);
        let shl = u32::from(shift >> 4);
        let v = s.pop()?;
        s.push(v.shr(shr).shl(shl))?;
        Ok(Some(pc))
    }
}

/// Trait for a Uxn-compatible device
///
/// A single device handle serves the whole bus; it is only called for ports
/// whose mask bit was registered with [`Uxn::connect`].
pub trait Device {
    /// Performs the `DEI` operation for the given target, returning its value
    fn dei(&mut self, vm: &mut Uxn, target: u8) -> u8;

    /// Performs the `DEO` operation on the given target
    ///
    /// The input byte has already been stored in port memory, and can be read
    /// with [`Uxn::read_dev_mem`] or through a [`Ports`] view.
    fn deo(&mut self, vm: &mut Uxn, target: u8);

    /// Handles a CPU fault
    ///
    /// Called synchronously when an instruction faults; the return value is
    /// passed through as the result of [`Uxn::eval`].
    fn halt(&mut self, vm: &mut Uxn, fault: Fault) -> bool {
        let _ = (vm, fault);
        false
    }
}

/// Trait for a type which can be cast to a device ports `struct`
pub trait Ports:
    zerocopy::IntoBytes
    + zerocopy::FromBytes
    + zerocopy::KnownLayout
    + zerocopy::Immutable
    + zerocopy::Unaligned
{
    /// Base address of the port, of the form `0xA0`
    const BASE: u8;
}

/// Device which does nothing
pub struct EmptyDevice;
impl Device for EmptyDevice {
    fn dei(&mut self, vm: &mut Uxn, target: u8) -> u8 {
        vm.read_dev_mem(target)
    }
    fn deo(&mut self, _vm: &mut Uxn, _target: u8) {
        // nothing to do here
    }
}

mod ram {
    use alloc::boxed::Box;

    /// Helper type for building a RAM array of the appropriate size
    pub struct UxnRam(Box<[u8; 65536]>);

    impl UxnRam {
        /// Builds a new zero-initialized RAM
        pub fn new() -> Self {
            UxnRam(Box::new([0u8; 65536]))
        }
    }

    impl Default for UxnRam {
        fn default() -> Self {
            Self::new()
        }
    }

    impl core::ops::Deref for UxnRam {
        type Target = [u8; 65536];
        fn deref(&self) -> &Self::Target {
            &self.0
        }
    }
    impl core::ops::DerefMut for UxnRam {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.0
        }
    }
}

pub use ram::UxnRam;

#[cfg(test)]
mod test {
    use super::*;

    const OPCODES: [&str; 32] = [
        "BRK", "INC", "POP", "NIP", "SWP", "ROT", "DUP", "OVR", //
        "EQU", "NEQ", "GTH", "LTH", "JMP", "JCN", "JSR", "STH", //
        "LDZ", "STZ", "LDR", "STR", "LDA", "STA", "DEI", "DEO", //
        "ADD", "SUB", "MUL", "DIV", "AND", "ORA", "EOR", "SFT",
    ];

    /// Simple parser for textual opcodes, e.g. `ADD2k`
    fn decode_op(s: &str) -> Option<u8> {
        match s {
            "JCI" => return Some(0x20),
            "JMI" => return Some(0x40),
            "JSI" => return Some(0x60),
            _ => (),
        }
        let name = s.get(..3)?;
        let mut mode = 0;
        for c in s[3..].chars() {
            mode |= match c {
                '2' => 0x20,
                'r' => 0x40,
                'k' => 0x80,
                _ => return None,
            };
        }
        if name == "LIT" {
            return Some(0x80 | mode);
        }
        let i = OPCODES.iter().position(|&n| n == name)?;
        Some(i as u8 | mode)
    }

    /// Tiny assembler: `#12` and `#1234` are literals, `ab` is a raw byte,
    /// anything else is an opcode name
    fn assemble(s: &str) -> Vec<u8> {
        let mut out = vec![];
        for t in s.split_whitespace() {
            if let Some(h) = t.strip_prefix('#') {
                match h.len() {
                    2 => out.extend([0x80, u8::from_str_radix(h, 16).unwrap()]),
                    4 => {
                        let v = u16::from_str_radix(h, 16).unwrap();
                        out.push(0xa0);
                        out.extend(v.to_be_bytes());
                    }
                    _ => panic!("invalid literal {t:?}"),
                }
            } else if let Some(op) = decode_op(t) {
                out.push(op);
            } else {
                out.push(u8::from_str_radix(t, 16).unwrap());
            }
        }
        out
    }

    /// Device which records faults and device traffic
    #[derive(Default)]
    struct Probe {
        fault: Option<Fault>,
        writes: Vec<(u8, u8)>,
    }

    impl Device for Probe {
        fn dei(&mut self, vm: &mut Uxn, target: u8) -> u8 {
            vm.read_dev_mem(target).wrapping_add(1)
        }
        fn deo(&mut self, vm: &mut Uxn, target: u8) {
            self.writes.push((target, vm.read_dev_mem(target)));
        }
        fn halt(&mut self, _vm: &mut Uxn, fault: Fault) -> bool {
            self.fault = Some(fault);
            false
        }
    }

    fn run(src: &str) -> (Uxn, Probe, bool) {
        let mut vm = Uxn::new();
        let rom = assemble(src);
        assert!(vm.load(&rom).is_empty());
        let mut dev = Probe::default();
        let ok = vm.eval(&mut dev, PAGE_PROGRAM);
        (vm, dev, ok)
    }

    fn parse_and_test(s: &str) {
        let Some((prog, expected)) = s.split_once('(') else {
            return;
        };
        let expected: Vec<u8> = expected
            .trim()
            .trim_end_matches(')')
            .split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect();
        let (vm, dev, ok) = run(&format!("{prog} BRK"));
        assert!(ok, "{:?} faulted: {:?}", prog.trim(), dev.fault);
        assert_eq!(
            vm.stack().data(),
            expected.as_slice(),
            "failed to execute {:?}",
            prog.trim()
        );
    }

    #[test]
    fn opcodes() {
        const TEST_SUITE: &str = "
            #01 INC         ( 02 )
            #0001 INC2      ( 00 02 )
            #0001 INC2k     ( 00 01 00 02 )
            #1234 POP    ( 12 )
            #1234 POP2   ( )
            #1234 POP2k  ( 12 34 )
            #1234 NIP          ( 34 )
            #1234 #5678 NIP2   ( 56 78 )
            #1234 #5678 NIP2k  ( 12 34 56 78 56 78 )
            #1234 SWP          ( 34 12 )
            #1234 SWPk         ( 12 34 34 12 )
            #1234 #5678 SWP2   ( 56 78 12 34 )
            #1234 #5678 SWP2k  ( 12 34 56 78 56 78 12 34 )
            #1234 #56 ROT            ( 34 56 12 )
            #1234 #56 ROTk           ( 12 34 56 34 56 12 )
            #1234 #5678 #9abc ROT2   ( 56 78 9a bc 12 34 )
            #1234 #5678 #9abc ROT2k  ( 12 34 56 78 9a bc 56 78 9a bc 12 34 )
            #1234 DUP   ( 12 34 34 )
            #12 DUPk    ( 12 12 12 )
            #1234 DUP2  ( 12 34 12 34 )
            #1234 OVR          ( 12 34 12 )
            #1234 OVRk         ( 12 34 12 34 12 )
            #1234 #5678 OVR2   ( 12 34 56 78 12 34 )
            #1234 #5678 OVR2k  ( 12 34 56 78 12 34 56 78 12 34 )
            #1212 EQU          ( 01 )
            #1234 EQUk         ( 12 34 00 )
            #abcd #ef01 EQU2   ( 00 )
            #abcd #abcd EQU2k  ( ab cd ab cd 01 )
            #1212 NEQ          ( 00 )
            #1234 NEQk         ( 12 34 01 )
            #abcd #ef01 NEQ2   ( 01 )
            #abcd #abcd NEQ2k  ( ab cd ab cd 00 )
            #1234 GTH          ( 00 )
            #3412 GTHk         ( 34 12 01 )
            #3456 #1234 GTH2   ( 01 )
            #1234 #3456 GTH2k  ( 12 34 34 56 00 )
            #0101 LTH          ( 00 )
            #0100 LTHk         ( 01 00 00 )
            #0001 #0000 LTH2   ( 00 )
            #0001 #0000 LTH2k  ( 00 01 00 00 00 )
            #1a #2e ADD       ( 48 )
            #02 #5d ADDk      ( 02 5d 5f )
            #0001 #0002 ADD2  ( 00 03 )
            #00ff #0001 ADD2  ( 01 00 )
            #ff #01 ADD       ( 00 )
            #10 #02 DIV       ( 08 )
            #10 #03 DIVk      ( 10 03 05 )
            #1000 #0003 DIV2  ( 05 55 )
            #34 #10 SFT        ( 68 )
            #34 #01 SFT        ( 1a )
            #34 #33 SFTk       ( 34 33 30 )
            #1248 #34 SFT2k    ( 12 48 34 09 20 )
            #ff #09 SFT        ( 00 )
            #01 #80 SFT        ( 00 )
            #05 DUP POP        ( 05 )
            #12 #34 MUL        ( a8 )
            #0c #0a AND        ( 08 )
            #0c #0a ORA        ( 0e )
            #0c #0a EOR        ( 06 )
            #01 #02 SUB        ( ff )
            LIT 12          ( 12 )
            LIT2 ab cd      ( ab cd )
        ";
        for line in TEST_SUITE.lines() {
            parse_and_test(line);
        }
    }

    #[test]
    fn brk_first() {
        let (vm, dev, ok) = run("BRK");
        assert!(ok);
        assert!(dev.fault.is_none());
        assert!(vm.stack().is_empty());
        assert!(vm.ret().is_empty());
    }

    #[test]
    fn zero_vector_and_halt_flag() {
        let mut vm = Uxn::new();
        vm.load(&assemble("#01 BRK"));
        assert!(!vm.eval(&mut EmptyDevice, 0));

        vm.write_dev_mem(HALT_PORT, 1);
        assert!(!vm.eval(&mut EmptyDevice, PAGE_PROGRAM));
        assert!(vm.stack().is_empty());

        vm.write_dev_mem(HALT_PORT, 0);
        assert!(vm.eval(&mut EmptyDevice, PAGE_PROGRAM));
        assert_eq!(vm.stack().data(), &[1]);
    }

    #[test]
    fn overflow() {
        let src = "#01 ".repeat(256);
        let (vm, dev, ok) = run(&src);
        assert!(!ok);
        let fault = dev.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::StackOverflow);
        assert_eq!(fault.kind.code(), 2);
        assert_eq!(fault.instr, 0x80);
        assert_eq!(fault.addr, PAGE_PROGRAM + 255 * 2);
        assert_eq!(vm.stack().len(), 255);
    }

    #[test]
    fn underflow() {
        let (vm, dev, ok) = run("#01 ADD");
        assert!(!ok);
        let fault = dev.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
        assert_eq!(fault.addr, PAGE_PROGRAM + 2);
        assert!(vm.stack().is_empty());

        // Keep mode still checks against its virtual pointer
        let (vm, dev, _) = run("#01 POP2k");
        assert_eq!(dev.fault.unwrap().kind, FaultKind::StackUnderflow);
        assert_eq!(vm.stack().data(), &[1]);
    }

    #[test]
    fn divide_by_zero() {
        let (vm, dev, ok) = run("#07 #10 #00 DIV");
        assert!(!ok);
        let fault = dev.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::DivideByZero);
        assert_eq!(fault.instr, 0x1b);
        assert_eq!(fault.addr, PAGE_PROGRAM + 6);
        // Both operands were popped before the fault
        assert_eq!(vm.stack().data(), &[7]);

        let (_, dev, _) = run("#0010 #0000 DIV2");
        assert_eq!(dev.fault.unwrap().kind, FaultKind::DivideByZero);
    }

    #[test]
    fn eval_after_fault() {
        let mut vm = Uxn::new();
        vm.load(&assemble("POP BRK #02 BRK"));
        let mut dev = Probe::default();
        assert!(!vm.eval(&mut dev, PAGE_PROGRAM));
        assert!(vm.eval(&mut dev, PAGE_PROGRAM + 2));
        assert_eq!(vm.stack().data(), &[2]);
    }

    #[test]
    fn immediate_jumps() {
        // JMI skips over the #ff literal
        let (vm, _, ok) = run("JMI 00 02 #ff #01");
        assert!(ok);
        assert_eq!(vm.stack().data(), &[1]);

        // JCI only jumps on a non-zero condition
        let (vm, _, _) = run("#00 JCI 00 02 #aa #bb");
        assert_eq!(vm.stack().data(), &[0xaa, 0xbb]);
        let (vm, _, _) = run("#01 JCI 00 02 #aa #bb");
        assert_eq!(vm.stack().data(), &[0xbb]);

        // JSI pushes the return address to the return stack
        let (vm, _, _) = run("JSI 00 01 BRK #cc JMP2r");
        assert_eq!(vm.stack().data(), &[0xcc]);
        assert!(vm.ret().is_empty());
    }

    #[test]
    fn jsr_uses_opposite_stack() {
        // 0x100: #04 JSR  0x103: BRK  0x104: 00 00 00  0x107: #02 BRK
        let (vm, _, _) = run("#04 JSR BRK 00 00 00 #02");
        assert_eq!(vm.stack().data(), &[2]);
        assert_eq!(vm.ret().data(), &[0x01, 0x03]);

        // In return mode, the address comes from and goes to swapped stacks
        let (vm, _, _) = run("LITr 04 JSRr BRK 00 00 00 #02");
        assert_eq!(vm.stack().data(), &[0x01, 0x03, 0x02]);
        assert!(vm.ret().is_empty());
    }

    #[test]
    fn stash_and_literal_modes() {
        let (vm, _, _) = run("#12 STH LIT2r ab cd");
        assert!(vm.stack().is_empty());
        assert_eq!(vm.ret().data(), &[0x12, 0xab, 0xcd]);

        let (vm, _, _) = run("LITr 34 STHr");
        assert_eq!(vm.stack().data(), &[0x34]);
        assert!(vm.ret().is_empty());
    }

    #[test]
    fn memory() {
        let (vm, _, _) = run("#abcd #10 STZ2 #10 LDZ2 #11 LDZ");
        assert_eq!(vm.stack().data(), &[0xab, 0xcd, 0xcd]);
        assert_eq!(vm.ram_read_word(0x10), 0xabcd);

        let (vm, _, _) = run("#5a #8000 STA #8000 LDA #0000 LDA2");
        assert_eq!(vm.stack().data(), &[0x5a, 0x00, 0x00]);

        // LDR/STR offsets are relative to the next instruction
        let (vm, _, _) = run("#77 #04 STR #01 LDR BRK 00");
        assert_eq!(vm.ram_read_byte(0x109), 0x77);
        assert_eq!(vm.stack().data(), &[0x77]);
    }

    #[test]
    fn address_wrap() {
        let mut vm = Uxn::new();
        vm.ram_write_byte(0xffff, 0x12);
        vm.ram_write_byte(0x0000, 0x34);
        assert_eq!(vm.ram_read_word(0xffff), 0x1234);
    }

    #[test]
    fn device_ports() {
        let mut vm = Uxn::new();
        vm.connect(0x1, 0x8000, 0x0100);
        vm.load(&assemble("#41 #18 DEO #4243 #17 DEO2 #1f DEI2 #14 DEI"));
        vm.write_dev_mem(0x14, 0x09);
        vm.write_dev_mem(0x1f, 0x30);
        vm.write_dev_mem(0x20, 0x40);
        let mut dev = Probe::default();
        assert!(vm.eval(&mut dev, PAGE_PROGRAM));
        // 0x17 is plain storage, 0x18 is masked (and overwritten by DEO2)
        assert_eq!(dev.writes, vec![(0x18, 0x41), (0x18, 0x43)]);
        assert_eq!(vm.read_dev_mem(0x17), 0x42);
        // 0x1f is masked (the probe adds one), the spill into 0x20 is not
        assert_eq!(vm.stack().data(), &[0x31, 0x40, 0x09]);
    }

    #[test]
    fn load_replaces_memory() {
        let mut vm = Uxn::new();
        vm.ram_write_byte(0x10, 1);
        vm.stack_mut().push_byte(9).unwrap();
        let rest = vm.load(&[1, 2, 3]);
        assert!(rest.is_empty());
        assert_eq!(vm.ram_read_byte(0x10), 0);
        assert_eq!(&vm.ram()[0x100..0x104], &[1, 2, 3, 0]);
        assert_eq!(vm.stack().data(), &[9]);

        let big = vec![0xaa; 0x10000];
        assert_eq!(vm.load(&big).len(), 0x100);
    }

    #[test]
    fn fault_display() {
        let f = Fault {
            instr: 0x1b,
            kind: FaultKind::DivideByZero,
            addr: 0x0123,
        };
        assert_eq!(
            f.to_string(),
            "division by zero at 0x0123 (instruction 0x1b)"
        );
    }
}
