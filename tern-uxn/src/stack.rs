use crate::FaultKind;

/// Number of bytes a stack can hold
pub const STACK_SIZE: usize = 255;

/// Fixed-size stack, with room for 255 bytes
///
/// Shorts are stored big-endian, so the high byte sits deeper in the stack.
#[derive(Clone, Debug)]
pub struct Stack {
    data: [u8; STACK_SIZE],

    /// Number of occupied slots; the next `push` writes to `data[ptr]`
    ptr: u8,
}

impl Default for Stack {
    fn default() -> Self {
        Self {
            data: [0u8; STACK_SIZE],
            ptr: 0,
        }
    }
}

impl Stack {
    /// Pushes a byte, failing if the stack is full
    #[inline]
    pub fn push_byte(&mut self, v: u8) -> Result<(), FaultKind> {
        if usize::from(self.ptr) >= STACK_SIZE {
            return Err(FaultKind::StackOverflow);
        }
        self.data[usize::from(self.ptr)] = v;
        self.ptr += 1;
        Ok(())
    }

    /// Pushes a short, failing if there isn't room for both bytes
    ///
    /// Nothing is written if the push fails.
    #[inline]
    pub fn push_short(&mut self, v: u16) -> Result<(), FaultKind> {
        if usize::from(self.ptr) + 2 > STACK_SIZE {
            return Err(FaultKind::StackOverflow);
        }
        let [hi, lo] = v.to_be_bytes();
        self.data[usize::from(self.ptr)] = hi;
        self.data[usize::from(self.ptr) + 1] = lo;
        self.ptr += 2;
        Ok(())
    }

    #[inline]
    pub(crate) fn push(&mut self, v: Value) -> Result<(), FaultKind> {
        match v {
            Value::Short(v) => self.push_short(v),
            Value::Byte(v) => self.push_byte(v),
        }
    }

    /// Pops a byte, failing if the stack is empty
    #[inline]
    pub fn pop_byte(&mut self) -> Result<u8, FaultKind> {
        let (v, ptr) = self.read_byte(self.ptr)?;
        self.ptr = ptr;
        Ok(v)
    }

    /// Pops a short, failing if the stack holds fewer than two bytes
    #[inline]
    pub fn pop_short(&mut self) -> Result<u16, FaultKind> {
        let (v, ptr) = self.read_short(self.ptr)?;
        self.ptr = ptr;
        Ok(v)
    }

    /// Reads the byte below `ptr`, returning it and the decremented pointer
    #[inline]
    fn read_byte(&self, ptr: u8) -> Result<(u8, u8), FaultKind> {
        let ptr = ptr.checked_sub(1).ok_or(FaultKind::StackUnderflow)?;
        Ok((self.data[usize::from(ptr)], ptr))
    }

    /// Reads the short below `ptr`, returning it and the decremented pointer
    #[inline]
    fn read_short(&self, ptr: u8) -> Result<(u16, u8), FaultKind> {
        let ptr = ptr.checked_sub(2).ok_or(FaultKind::StackUnderflow)?;
        let hi = self.data[usize::from(ptr)];
        let lo = self.data[usize::from(ptr) + 1];
        Ok((u16::from_be_bytes([hi, lo]), ptr))
    }

    /// Peeks at a byte from the stack
    ///
    /// An offset of 0 is the top item; offsets past the bottom of the stack
    /// return 0.
    #[inline]
    pub fn peek_byte_at(&self, offset: u8) -> u8 {
        usize::from(self.ptr)
            .checked_sub(usize::from(offset) + 1)
            .map(|i| self.data[i])
            .unwrap_or(0)
    }

    /// Returns the occupied part of the stack, bottom first
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.ptr)]
    }

    /// Returns the number of items in the stack
    #[inline]
    pub fn len(&self) -> u8 {
        self.ptr
    }

    /// Checks whether the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr == 0
    }

    /// Sets the number of items in the stack, saturating at capacity
    #[inline]
    pub fn set_len(&mut self, n: u8) {
        self.ptr = n.min(STACK_SIZE as u8);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Value {
    Short(u16),
    Byte(u8),
}

impl Value {
    #[inline]
    pub(crate) fn wrapping_add(&self, i: u8) -> Self {
        match self {
            Value::Short(v) => Value::Short(v.wrapping_add(u16::from(i))),
            Value::Byte(v) => Value::Byte(v.wrapping_add(i)),
        }
    }

    /// Shifts right, producing zero if the shift exceeds the cell width
    #[inline]
    pub(crate) fn shr(&self, i: u32) -> Self {
        match self {
            Value::Short(v) => Value::Short(v.checked_shr(i).unwrap_or(0)),
            Value::Byte(v) => Value::Byte(v.checked_shr(i).unwrap_or(0)),
        }
    }

    /// Shifts left, producing zero if the shift exceeds the cell width
    #[inline]
    pub(crate) fn shl(&self, i: u32) -> Self {
        match self {
            Value::Short(v) => Value::Short(v.checked_shl(i).unwrap_or(0)),
            Value::Byte(v) => Value::Byte(v.checked_shl(i).unwrap_or(0)),
        }
    }
}

impl From<Value> for u16 {
    fn from(v: Value) -> u16 {
        match v {
            Value::Short(v) => v,
            Value::Byte(v) => u16::from(v),
        }
    }
}

/// Virtual stack, which is aware of `keep` and `short` modes
///
/// This type expects the user to perform all of their `pop()` calls first,
/// followed by any `push(..)` calls.  In `keep` mode, `pop()` only moves a
/// virtual pointer, so values are read without being removed; underflow is
/// still detected against that virtual pointer.
pub(crate) struct StackView<'a, const FLAGS: u8> {
    stack: &'a mut Stack,

    /// Virtual pointer, used in `keep` mode
    kptr: u8,
}

impl<'a, const FLAGS: u8> StackView<'a, FLAGS> {
    pub(crate) fn new(stack: &'a mut Stack) -> Self {
        let kptr = stack.ptr;
        Self { stack, kptr }
    }

    /// Pops a single value from the stack
    ///
    /// Returns a [`Value::Short`] if the short flag is set, and a
    /// [`Value::Byte`] otherwise.
    #[inline]
    pub(crate) fn pop(&mut self) -> Result<Value, FaultKind> {
        if crate::short(FLAGS) {
            self.pop_short().map(Value::Short)
        } else {
            self.pop_byte().map(Value::Byte)
        }
    }

    pub(crate) fn pop_byte(&mut self) -> Result<u8, FaultKind> {
        if crate::keep(FLAGS) {
            let (v, ptr) = self.stack.read_byte(self.kptr)?;
            self.kptr = ptr;
            Ok(v)
        } else {
            self.stack.pop_byte()
        }
    }

    pub(crate) fn pop_short(&mut self) -> Result<u16, FaultKind> {
        if crate::keep(FLAGS) {
            let (v, ptr) = self.stack.read_short(self.kptr)?;
            self.kptr = ptr;
            Ok(v)
        } else {
            self.stack.pop_short()
        }
    }

    pub(crate) fn push(&mut self, v: Value) -> Result<(), FaultKind> {
        self.stack.push(v)
    }

    pub(crate) fn push_byte(&mut self, v: u8) -> Result<(), FaultKind> {
        self.stack.push_byte(v)
    }

    pub(crate) fn push_short(&mut self, v: u16) -> Result<(), FaultKind> {
        self.stack.push_short(v)
    }
}
